//! WASM program round trips: upload, read-only invocation, exit-code
//! semantics inside blocks.

mod fixture;

use fixture::Fixture;
use meridian_types::protocol::ProgramInput;

/// A program whose `_start` writes the 4-byte little-endian value 42 to
/// stdout.
const WRITE_42: &str = r#"
(module
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 16) "\2a\00\00\00")
  (func (export "_start")
    (i32.store (i32.const 0) (i32.const 16)) ;; iov.buf
    (i32.store (i32.const 4) (i32.const 4))  ;; iov.len
    (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 8)))))
"#;

/// A program that immediately exits with code 5.
const EXIT_5: &str = r#"
(module
  (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
  (memory (export "memory") 1)
  (func (export "_start") (call $proc_exit (i32.const 5))))
"#;

/// A program that echoes its stdin to stdout.
const ECHO: &str = r#"
(module
  (import "wasi_snapshot_preview1" "fd_read"
    (func $fd_read (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (func (export "_start")
    ;; read up to 256 bytes from stdin into 1024
    (i32.store (i32.const 0) (i32.const 1024))
    (i32.store (i32.const 4) (i32.const 256))
    (drop (call $fd_read (i32.const 0) (i32.const 0) (i32.const 1) (i32.const 8)))
    ;; write however many bytes were read back to stdout
    (i32.store (i32.const 4) (i32.load (i32.const 8)))
    (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 8)))))
"#;

#[test]
fn upload_and_read_roundtrip() {
    let fixture = Fixture::new();

    let owner_key = Fixture::user_key("wasm-owner");
    let program = Fixture::program_account(&owner_key);
    let bytecode = wat::parse_str(WRITE_42).unwrap();

    fixture.submit_block(vec![fixture.make_transaction(
        &owner_key,
        1,
        9_000_000,
        vec![Fixture::upload_program_operation(&program, bytecode)],
    )]);

    let output = fixture
        .controller
        .read_program(&program, &ProgramInput::default())
        .unwrap();

    assert_eq!(output.code, 0);
    assert_eq!(output.stdout, vec![0x2a, 0x00, 0x00, 0x00]);
    assert!(output.stderr.is_empty());
}

#[test]
fn read_program_passes_stdin_through() {
    let fixture = Fixture::new();

    let owner_key = Fixture::user_key("wasm-owner");
    let program = Fixture::program_account(&owner_key);
    let bytecode = wat::parse_str(ECHO).unwrap();

    fixture.submit_block(vec![fixture.make_transaction(
        &owner_key,
        1,
        9_000_000,
        vec![Fixture::upload_program_operation(&program, bytecode)],
    )]);

    let output = fixture
        .controller
        .read_program(
            &program,
            &ProgramInput {
                stdin: b"ping".to_vec(),
                arguments: Vec::new(),
            },
        )
        .unwrap();

    assert_eq!(output.code, 0);
    assert_eq!(output.stdout, b"ping");
}

#[test]
fn nonzero_exit_surfaces_in_read_but_reverts_in_a_block() {
    let fixture = Fixture::new();

    let owner_key = Fixture::user_key("wasm-owner");
    let owner = Fixture::user_account(&owner_key);
    let program = Fixture::program_account(&owner_key);
    let bytecode = wat::parse_str(EXIT_5).unwrap();

    fixture.submit_block(vec![fixture.make_transaction(
        &owner_key,
        1,
        9_000_000,
        vec![Fixture::upload_program_operation(&program, bytecode)],
    )]);

    // Read-only: the exit code is data.
    let output = fixture
        .controller
        .read_program(&program, &ProgramInput::default())
        .unwrap();
    assert_eq!(output.code, 5);
    assert!(output.stdout.is_empty());

    // Inside a block: the call operation reverts the transaction, the nonce
    // still advances.
    let call = fixture.make_transaction(
        &owner_key,
        2,
        8_000_000,
        vec![Fixture::call_operation(&program, Vec::new())],
    );
    let block = fixture.make_block(vec![call]);
    let receipt = fixture
        .controller
        .process_block(&block, 0, Fixture::now_ms())
        .unwrap()
        .unwrap();

    assert_eq!(receipt.transaction_receipts.len(), 1);
    assert!(receipt.transaction_receipts[0].reverted);
    assert_eq!(fixture.controller.account_nonce(&owner), 2);
}

#[test]
fn calling_a_missing_program_reverts() {
    let fixture = Fixture::new();

    let owner_key = Fixture::user_key("nobody");
    let owner = Fixture::user_account(&owner_key);
    let ghost = Fixture::program_account(&Fixture::user_key("ghost"));

    let call = fixture.make_transaction(
        &owner_key,
        1,
        8_000_000,
        vec![Fixture::call_operation(&ghost, vec![1, 2, 3, 4])],
    );
    let block = fixture.make_block(vec![call]);
    let receipt = fixture
        .controller
        .process_block(&block, 0, Fixture::now_ms())
        .unwrap()
        .unwrap();

    assert!(receipt.transaction_receipts[0].reverted);
    assert_eq!(fixture.controller.account_nonce(&owner), 1);
}
