//! The wasmtime adapter: deterministic engine, module cache, one instance
//! per invocation, and the concrete host-function ABI.

use crate::error::VmError;
use crate::host::{errno, HostApi, FD_STDERR, FD_STDIN, FD_STDOUT};
use meridian_crypto::Digest;
use meridian_types::{ControllerError, Error};
use parking_lot::Mutex;
use std::collections::HashMap;
use wasmtime::{
    Caller, Config, Engine, Linker, Memory, Module, Store, StoreLimits, StoreLimitsBuilder, Trap,
};

/// Number of 64 KiB pages a module may allocate.
const MEMORY_PAGES_LIMIT: usize = 512;
const WASM_PAGE: usize = 64 * 1024;

/// Carried through a trap when the guest calls `proc_exit`.
#[derive(Debug)]
struct ProcExit(i32);

impl std::fmt::Display for ProcExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "proc_exit({})", self.0)
    }
}

impl std::error::Error for ProcExit {}

/// Carried through a trap when a host call must abort the program.
#[derive(Debug)]
struct HostAbort(Error);

impl std::fmt::Display for HostAbort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "host abort: {}", self.0)
    }
}

impl std::error::Error for HostAbort {}

/// Carried through a trap for machine-level host-side failures.
#[derive(Debug)]
struct VmTrap(VmError);

impl std::fmt::Display for VmTrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vm trap: {}", self.0)
    }
}

impl std::error::Error for VmTrap {}

/// Type-erased pointer to the execution context's [`HostApi`] side.
///
/// Raw so the store data stays `'static`; validity is scoped to one
/// [`VirtualMachine::run`] call.
struct HostHandle {
    ptr: *mut (dyn HostApi + 'static),
}

// Host functions only run on the thread driving the store.
unsafe impl Send for HostHandle {}

struct StoreCtx {
    host: HostHandle,
    limits: StoreLimits,
}

/// Dispatch one host call through the handle.
///
/// SAFETY: the pointer is valid for the duration of `run`, and wasm
/// execution is single threaded; reentrant invocations (a host call that
/// starts a nested program) are strictly nested, never concurrent.
macro_rules! host {
    ($caller:expr) => {
        unsafe { &mut *$caller.data().host.ptr }
    };
}

fn invalid_pointer() -> wasmtime::Error {
    wasmtime::Error::new(VmTrap(VmError::InvalidPointer))
}

fn memory_of(caller: &mut Caller<'_, StoreCtx>) -> Result<Memory, wasmtime::Error> {
    caller
        .get_export("memory")
        .and_then(|export| export.into_memory())
        .ok_or_else(|| wasmtime::Error::new(VmTrap(VmError::InvalidModule)))
}

fn guest_range(ptr: u32, len: u32, size: usize) -> Result<std::ops::Range<usize>, wasmtime::Error> {
    let start = ptr as usize;
    let end = start
        .checked_add(len as usize)
        .ok_or_else(invalid_pointer)?;
    if end > size {
        return Err(invalid_pointer());
    }
    Ok(start..end)
}

fn read_guest(
    caller: &mut Caller<'_, StoreCtx>,
    memory: &Memory,
    ptr: u32,
    len: u32,
) -> Result<Vec<u8>, wasmtime::Error> {
    let data = memory.data(&caller);
    let range = guest_range(ptr, len, data.len())?;
    Ok(data[range].to_vec())
}

fn write_guest(
    caller: &mut Caller<'_, StoreCtx>,
    memory: &Memory,
    ptr: u32,
    bytes: &[u8],
) -> Result<(), wasmtime::Error> {
    let data = memory.data_mut(caller);
    let range = guest_range(ptr, bytes.len() as u32, data.len())?;
    data[range].copy_from_slice(bytes);
    Ok(())
}

fn read_guest_u32(
    caller: &mut Caller<'_, StoreCtx>,
    memory: &Memory,
    ptr: u32,
) -> Result<u32, wasmtime::Error> {
    let bytes = read_guest(caller, memory, ptr, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn write_guest_u32(
    caller: &mut Caller<'_, StoreCtx>,
    memory: &Memory,
    ptr: u32,
    value: u32,
) -> Result<(), wasmtime::Error> {
    write_guest(caller, memory, ptr, &value.to_le_bytes())
}

/// Map a host-call result to an errno, aborting the program on halting
/// errors (resource exhaustion cannot be handled from inside the sandbox).
fn errno_or_abort(result: Result<(), Error>, fallback: i32) -> Result<i32, wasmtime::Error> {
    match result {
        Ok(()) => Ok(errno::SUCCESS),
        Err(error) if error.halts() => Err(wasmtime::Error::new(HostAbort(error))),
        Err(_) => Ok(fallback),
    }
}

/// The WASM engine: deterministic configuration plus a module cache keyed by
/// program hash.
pub struct VirtualMachine {
    engine: Engine,
    modules: Mutex<HashMap<Digest, Module>>,
}

impl VirtualMachine {
    /// Build the deterministically configured engine: fuel metering on,
    /// threads and SIMD off.
    pub fn new() -> Result<Self, VmError> {
        let mut config = Config::new();
        config.consume_fuel(true);
        config.wasm_threads(false);
        config.wasm_relaxed_simd(false);
        config.wasm_simd(false);

        let engine = Engine::new(&config)
            .map_err(|e| VmError::ExecutionEnvironmentFailure(e.to_string()))?;

        Ok(Self {
            engine,
            modules: Mutex::new(HashMap::new()),
        })
    }

    /// Fetch the compiled module for `id`, compiling `bytecode` on a miss.
    fn get_or_create(&self, id: &Digest, bytecode: &[u8]) -> Result<Module, VmError> {
        if let Some(module) = self.modules.lock().get(id) {
            return Ok(module.clone());
        }

        let module = Module::new(&self.engine, bytecode)
            .map_err(|e| VmError::LoadFailure(e.to_string()))?;

        self.modules.lock().insert(*id, module.clone());
        tracing::debug!(target: "vm", bytes = bytecode.len(), "module compiled");
        Ok(module)
    }

    /// Execute a program to completion or trap.
    ///
    /// The fuel budget is polled from the host meter up front and consumed
    /// fuel is surrendered afterwards; running out of fuel surfaces as a
    /// compute-bandwidth limit error.
    pub fn run(
        &self,
        host: &mut dyn HostApi,
        bytecode: &[u8],
        id: &Digest,
    ) -> Result<(), VmError> {
        let module = self.get_or_create(id, bytecode)?;
        let initial_fuel = host.get_meter_ticks();

        // SAFETY: `host` outlives the store; see `HostHandle`.
        let handle = HostHandle {
            ptr: unsafe {
                std::mem::transmute::<*mut (dyn HostApi + '_), *mut (dyn HostApi + 'static)>(
                    host as *mut dyn HostApi,
                )
            },
        };

        let limits = StoreLimitsBuilder::new()
            .memory_size(MEMORY_PAGES_LIMIT * WASM_PAGE)
            .memories(1)
            .build();

        let mut store = Store::new(&self.engine, StoreCtx { host: handle, limits });
        store.limiter(|ctx| &mut ctx.limits);
        store
            .set_fuel(initial_fuel)
            .map_err(|e| VmError::ExecutionEnvironmentFailure(e.to_string()))?;

        let mut linker: Linker<StoreCtx> = Linker::new(&self.engine);
        register_host_functions(&mut linker)
            .map_err(|e| VmError::ExecutionEnvironmentFailure(e.to_string()))?;

        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| VmError::InstantiateFailure(e.to_string()))?;

        let start = instance
            .get_typed_func::<(), ()>(&mut store, "_start")
            .map_err(|_| VmError::EntryPointNotFound)?;

        let outcome = start.call(&mut store, ());

        let consumed = initial_fuel.saturating_sub(store.get_fuel().unwrap_or(0));
        let surrender = host.use_meter_ticks(consumed);

        match outcome {
            Ok(()) => {
                surrender.map_err(VmError::Host)?;
                Ok(())
            }
            Err(error) => {
                if let Some(exit) = error.downcast_ref::<ProcExit>() {
                    surrender.map_err(VmError::Host)?;
                    return match exit.0 {
                        0 => Ok(()),
                        code => Err(VmError::Exit(code)),
                    };
                }
                if let Some(abort) = error.downcast_ref::<HostAbort>() {
                    return Err(VmError::Host(abort.0));
                }
                if let Some(VmTrap(vm_error)) = error.downcast_ref::<VmTrap>() {
                    return Err(clone_vm_error(vm_error));
                }
                if error.downcast_ref::<Trap>() == Some(&Trap::OutOfFuel) {
                    return Err(VmError::Host(Error::Controller(
                        ControllerError::ComputeBandwidthLimitExceeded,
                    )));
                }
                surrender.map_err(VmError::Host)?;
                Err(VmError::Trapped)
            }
        }
    }
}

fn clone_vm_error(error: &VmError) -> VmError {
    match error {
        VmError::Trapped => VmError::Trapped,
        VmError::InvalidPointer => VmError::InvalidPointer,
        VmError::InvalidModule => VmError::InvalidModule,
        VmError::LoadFailure(s) => VmError::LoadFailure(s.clone()),
        VmError::InstantiateFailure(s) => VmError::InstantiateFailure(s.clone()),
        VmError::EntryPointNotFound => VmError::EntryPointNotFound,
        VmError::ExecutionEnvironmentFailure(s) => VmError::ExecutionEnvironmentFailure(s.clone()),
        VmError::Exit(code) => VmError::Exit(*code),
        VmError::Host(e) => VmError::Host(*e),
    }
}

fn register_host_functions(linker: &mut Linker<StoreCtx>) -> Result<(), wasmtime::Error> {
    const WASI: &str = "wasi_snapshot_preview1";
    const ENV: &str = "env";

    linker.func_wrap(
        WASI,
        "args_sizes_get",
        |mut caller: Caller<'_, StoreCtx>,
         argc_ptr: u32,
         argv_buf_size_ptr: u32|
         -> Result<i32, wasmtime::Error> {
            let memory = memory_of(&mut caller)?;
            let arguments = host!(caller).arguments();
            let total: u32 = arguments.iter().map(|a| a.len() as u32 + 1).sum();

            write_guest_u32(&mut caller, &memory, argc_ptr, arguments.len() as u32)?;
            write_guest_u32(&mut caller, &memory, argv_buf_size_ptr, total)?;
            Ok(errno::SUCCESS)
        },
    )?;

    linker.func_wrap(
        WASI,
        "args_get",
        |mut caller: Caller<'_, StoreCtx>,
         argv_ptr: u32,
         argv_buf_ptr: u32|
         -> Result<i32, wasmtime::Error> {
            let memory = memory_of(&mut caller)?;
            let arguments = host!(caller).arguments();

            let mut offset = argv_buf_ptr;
            for (index, argument) in arguments.iter().enumerate() {
                write_guest_u32(&mut caller, &memory, argv_ptr + 4 * index as u32, offset)?;
                write_guest(&mut caller, &memory, offset, argument)?;
                write_guest(&mut caller, &memory, offset + argument.len() as u32, &[0])?;
                offset += argument.len() as u32 + 1;
            }
            Ok(errno::SUCCESS)
        },
    )?;

    linker.func_wrap(
        WASI,
        "fd_write",
        |mut caller: Caller<'_, StoreCtx>,
         fd: u32,
         iovs_ptr: u32,
         iovs_len: u32,
         nwritten_ptr: u32|
         -> Result<i32, wasmtime::Error> {
            let memory = memory_of(&mut caller)?;
            let mut written: u32 = 0;

            for i in 0..iovs_len {
                let base = iovs_ptr + i * 8;
                let buf = read_guest_u32(&mut caller, &memory, base)?;
                let len = read_guest_u32(&mut caller, &memory, base + 4)?;
                let bytes = read_guest(&mut caller, &memory, buf, len)?;

                match errno_or_abort(host!(caller).write_stream(fd, &bytes), errno::BADF)? {
                    errno::SUCCESS => written += len,
                    other => return Ok(other),
                }
            }

            write_guest_u32(&mut caller, &memory, nwritten_ptr, written)?;
            Ok(errno::SUCCESS)
        },
    )?;

    linker.func_wrap(
        WASI,
        "fd_read",
        |mut caller: Caller<'_, StoreCtx>,
         fd: u32,
         iovs_ptr: u32,
         iovs_len: u32,
         nread_ptr: u32|
         -> Result<i32, wasmtime::Error> {
            let memory = memory_of(&mut caller)?;
            let mut read: u32 = 0;

            for i in 0..iovs_len {
                let base = iovs_ptr + i * 8;
                let buf = read_guest_u32(&mut caller, &memory, base)?;
                let len = read_guest_u32(&mut caller, &memory, base + 4)?;

                let mut buffer = vec![0u8; len as usize];
                let count = match host!(caller).read_stream(fd, &mut buffer) {
                    Ok(count) => count,
                    Err(error) if error.halts() => {
                        return Err(wasmtime::Error::new(HostAbort(error)))
                    }
                    Err(_) => return Ok(errno::BADF),
                };

                write_guest(&mut caller, &memory, buf, &buffer[..count])?;
                read += count as u32;

                if count < len as usize {
                    break;
                }
            }

            write_guest_u32(&mut caller, &memory, nread_ptr, read)?;
            Ok(errno::SUCCESS)
        },
    )?;

    linker.func_wrap(
        WASI,
        "fd_seek",
        |mut caller: Caller<'_, StoreCtx>,
         _fd: u32,
         _offset: i64,
         _whence: u32,
         newoffset_ptr: u32|
         -> Result<i32, wasmtime::Error> {
            // Streams are not seekable; report position zero.
            let memory = memory_of(&mut caller)?;
            write_guest(&mut caller, &memory, newoffset_ptr, &0u64.to_le_bytes())?;
            Ok(errno::SUCCESS)
        },
    )?;

    linker.func_wrap(
        WASI,
        "fd_close",
        |_caller: Caller<'_, StoreCtx>, _fd: u32| -> Result<i32, wasmtime::Error> {
            Ok(errno::SUCCESS)
        },
    )?;

    linker.func_wrap(
        WASI,
        "fd_fdstat_get",
        |mut caller: Caller<'_, StoreCtx>,
         fd: u32,
         stat_ptr: u32|
         -> Result<i32, wasmtime::Error> {
            const FILETYPE_CHARACTER_DEVICE: u8 = 2;
            const RIGHTS_FD_READ: u64 = 1 << 1;
            const RIGHTS_FD_WRITE: u64 = 1 << 6;

            let rights = match fd {
                FD_STDIN => RIGHTS_FD_READ,
                FD_STDOUT | FD_STDERR => RIGHTS_FD_WRITE,
                _ => return Ok(errno::BADF),
            };

            let mut stat = [0u8; 24];
            stat[0] = FILETYPE_CHARACTER_DEVICE;
            stat[8..16].copy_from_slice(&rights.to_le_bytes());

            let memory = memory_of(&mut caller)?;
            write_guest(&mut caller, &memory, stat_ptr, &stat)?;
            Ok(errno::SUCCESS)
        },
    )?;

    linker.func_wrap(
        WASI,
        "proc_exit",
        |_caller: Caller<'_, StoreCtx>, code: i32| -> Result<(), wasmtime::Error> {
            Err(wasmtime::Error::new(ProcExit(code)))
        },
    )?;

    linker.func_wrap(
        ENV,
        "meridian_get_caller",
        |mut caller: Caller<'_, StoreCtx>,
         ret_ptr: u32,
         ret_len_ptr: u32|
         -> Result<i32, wasmtime::Error> {
            let memory = memory_of(&mut caller)?;
            let capacity = read_guest_u32(&mut caller, &memory, ret_len_ptr)?;

            let account = host!(caller).get_caller();
            if account.len() as u32 > capacity {
                return Ok(errno::OVERFLOW);
            }

            write_guest(&mut caller, &memory, ret_ptr, &account)?;
            write_guest_u32(&mut caller, &memory, ret_len_ptr, account.len() as u32)?;
            Ok(errno::SUCCESS)
        },
    )?;

    linker.func_wrap(
        ENV,
        "meridian_get_object",
        |mut caller: Caller<'_, StoreCtx>,
         space_id: u32,
         key_ptr: u32,
         key_len: u32,
         ret_ptr: u32,
         ret_len_ptr: u32|
         -> Result<i32, wasmtime::Error> {
            let memory = memory_of(&mut caller)?;
            let key = read_guest(&mut caller, &memory, key_ptr, key_len)?;
            let capacity = read_guest_u32(&mut caller, &memory, ret_len_ptr)?;

            let object = host!(caller).get_object(space_id, &key);
            if object.len() as u32 > capacity {
                return Ok(errno::OVERFLOW);
            }

            write_guest(&mut caller, &memory, ret_ptr, &object)?;
            write_guest_u32(&mut caller, &memory, ret_len_ptr, object.len() as u32)?;
            Ok(errno::SUCCESS)
        },
    )?;

    linker.func_wrap(
        ENV,
        "meridian_put_object",
        |mut caller: Caller<'_, StoreCtx>,
         space_id: u32,
         key_ptr: u32,
         key_len: u32,
         value_ptr: u32,
         value_len: u32|
         -> Result<i32, wasmtime::Error> {
            let memory = memory_of(&mut caller)?;
            let key = read_guest(&mut caller, &memory, key_ptr, key_len)?;
            let value = read_guest(&mut caller, &memory, value_ptr, value_len)?;

            errno_or_abort(
                host!(caller).put_object(space_id, &key, &value),
                errno::INVAL,
            )
        },
    )?;

    linker.func_wrap(
        ENV,
        "meridian_check_authority",
        |mut caller: Caller<'_, StoreCtx>,
         account_ptr: u32,
         account_len: u32,
         result_ptr: u32|
         -> Result<i32, wasmtime::Error> {
            if account_len as usize != meridian_types::protocol::ACCOUNT_LEN {
                return Ok(errno::INVAL);
            }

            let memory = memory_of(&mut caller)?;
            let account = read_guest(&mut caller, &memory, account_ptr, account_len)?;

            match host!(caller).check_authority(&account) {
                Ok(authorized) => {
                    write_guest(&mut caller, &memory, result_ptr, &[authorized as u8])?;
                    Ok(errno::SUCCESS)
                }
                Err(error) => Err(wasmtime::Error::new(HostAbort(error))),
            }
        },
    )?;

    Ok(())
}
