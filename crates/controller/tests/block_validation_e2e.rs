//! Block-level validation: duplicates, parent resolution, height and
//! timestamp windows, merkle anchoring, and irreversibility commits.

mod fixture;

use fixture::Fixture;
use meridian_types::{ControllerError, Error};

fn controller_error(error: ControllerError) -> Error {
    Error::Controller(error)
}

#[test]
fn duplicate_block_is_a_noop_success() {
    let fixture = Fixture::new();

    let block = fixture.make_block(Vec::new());
    assert!(fixture
        .controller
        .process_block(&block, 0, Fixture::now_ms())
        .unwrap()
        .is_some());

    let duplicate = fixture
        .controller
        .process_block(&block, 0, Fixture::now_ms())
        .unwrap();
    assert!(duplicate.is_none());

    assert_eq!(fixture.controller.head().height, 1);
}

#[test]
fn malformed_block_is_rejected() {
    let fixture = Fixture::new();

    let mut block = fixture.make_block(Vec::new());
    block.id[0] ^= 0x01;

    assert_eq!(
        fixture
            .controller
            .process_block(&block, 0, Fixture::now_ms()),
        Err(controller_error(ControllerError::MalformedBlock))
    );
}

#[test]
fn unknown_previous_block_is_rejected() {
    let fixture = Fixture::new();

    let head = fixture.controller.head();
    let block = fixture.make_block_at(
        head.height + 1,
        Fixture::now_ms(),
        [0xee; 32],
        head.state_merkle_root,
        Vec::new(),
    );

    assert_eq!(
        fixture
            .controller
            .process_block(&block, 0, Fixture::now_ms()),
        Err(controller_error(ControllerError::UnknownPreviousBlock))
    );
}

#[test]
fn wrong_signer_is_rejected() {
    let fixture = Fixture::new();

    let head = fixture.controller.head();
    let now = Fixture::now_ms();
    let impostor = Fixture::user_key("impostor");

    let mut block = fixture.make_block_at(
        head.height + 1,
        now,
        head.id,
        head.state_merkle_root,
        Vec::new(),
    );
    block.signer = Fixture::user_account(&impostor);
    block.id = block.compute_id();
    block.signature = impostor.sign(&block.id).unwrap();

    assert_eq!(
        fixture.controller.process_block(&block, 0, now),
        Err(controller_error(ControllerError::InvalidSignature))
    );
}

#[test]
fn genesis_block_height_must_be_one() {
    let fixture = Fixture::new();

    let head = fixture.controller.head();
    let block = fixture.make_block_at(
        2,
        Fixture::now_ms(),
        head.id,
        head.state_merkle_root,
        Vec::new(),
    );

    assert_eq!(
        fixture
            .controller
            .process_block(&block, 0, Fixture::now_ms()),
        Err(controller_error(ControllerError::UnexpectedHeight))
    );
}

#[test]
fn non_sequential_height_is_rejected() {
    let fixture = Fixture::new();
    fixture.submit_block(Vec::new());

    let head = fixture.controller.head();
    let block = fixture.make_block_at(
        head.height + 2,
        head.time + 1,
        head.id,
        head.state_merkle_root,
        Vec::new(),
    );

    assert_eq!(
        fixture
            .controller
            .process_block(&block, 0, Fixture::now_ms()),
        Err(controller_error(ControllerError::UnexpectedHeight))
    );
}

#[test]
fn state_merkle_mismatch_is_rejected() {
    let fixture = Fixture::new();
    fixture.submit_block(Vec::new());

    let head = fixture.controller.head();
    let block = fixture.make_block_at(
        head.height + 1,
        head.time + 1,
        head.id,
        [0x99; 32],
        Vec::new(),
    );

    assert_eq!(
        fixture
            .controller
            .process_block(&block, 0, Fixture::now_ms()),
        Err(controller_error(ControllerError::StateMerkleMismatch))
    );
}

#[test]
fn future_timestamp_is_rejected() {
    let fixture = Fixture::new();

    let head = fixture.controller.head();
    let now = Fixture::now_ms();
    let block = fixture.make_block_at(
        head.height + 1,
        now + 60_000,
        head.id,
        head.state_merkle_root,
        Vec::new(),
    );

    assert_eq!(
        fixture.controller.process_block(&block, 0, now),
        Err(controller_error(ControllerError::TimestampOutOfBounds))
    );
}

#[test]
fn stale_timestamp_is_rejected() {
    let fixture = Fixture::new();
    fixture.submit_block(Vec::new());

    // A child whose timestamp does not advance past its parent is invalid.
    let head = fixture.controller.head();
    let block = fixture.make_block_at(
        head.height + 1,
        head.time,
        head.id,
        head.state_merkle_root,
        Vec::new(),
    );

    assert_eq!(
        fixture
            .controller
            .process_block(&block, 0, Fixture::now_ms()),
        Err(controller_error(ControllerError::TimestampOutOfBounds))
    );

    // The rejected block leaves no residue; the next valid block applies.
    fixture.submit_block(Vec::new());
    assert_eq!(fixture.controller.head().height, 2);
}

#[test]
fn irreversibility_window_commits_ancestors() {
    let fixture = Fixture::new();

    // Advance 70 blocks; the window of 60 leaves the root at revision 10.
    for _ in 0..70 {
        fixture.submit_block(Vec::new());
    }
    assert_eq!(fixture.controller.head().height, 70);
    assert_eq!(fixture.controller.head().last_irreversible_block, 10);

    // A block below irreversibility with an unknown parent is triaged as
    // pre-irreversibility.
    let pre = fixture.make_block_at(1, Fixture::now_ms(), [0xee; 32], [0u8; 32], Vec::new());
    assert_eq!(
        fixture.controller.process_block(&pre, 0, Fixture::now_ms()),
        Err(controller_error(ControllerError::PreIrreversibilityBlock))
    );

    // An unknown parent above irreversibility is just unknown.
    let unknown = fixture.make_block_at(20, Fixture::now_ms(), [0xee; 32], [0u8; 32], Vec::new());
    assert_eq!(
        fixture
            .controller
            .process_block(&unknown, 0, Fixture::now_ms()),
        Err(controller_error(ControllerError::UnknownPreviousBlock))
    );

    // The chain keeps extending after commits.
    fixture.submit_block(Vec::new());
    assert_eq!(fixture.controller.head().height, 71);
}

#[test]
fn rejected_blocks_leave_no_state_node_behind() {
    let fixture = Fixture::new();

    let head = fixture.controller.head();
    let now = Fixture::now_ms();
    let block = fixture.make_block_at(
        head.height + 1,
        now + 60_000,
        head.id,
        head.state_merkle_root,
        Vec::new(),
    );

    // Too far in the future right now.
    assert!(fixture.controller.process_block(&block, 0, now).is_err());

    // Once the clock catches up the very same block must apply; a leaked
    // node from the rejection would make it look like a duplicate.
    let receipt = fixture
        .controller
        .process_block(&block, 0, now + 60_000)
        .unwrap();
    assert!(receipt.is_some());
    assert_eq!(fixture.controller.head().height, 1);
}
