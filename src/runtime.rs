//! Shared async runtime for blocking entry points
//!
//! Synchronous callers (`execute()`, the FFI layer, voice sessions started outside
//! tokio) run their futures on one process-wide multi-threaded runtime. It lives in a
//! static so it is never dropped from inside an async context.

use std::future::Future;
use std::sync::OnceLock;

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::error;

use crate::error::{Error, Result};

static SHARED: OnceLock<Option<Runtime>> = OnceLock::new();

fn shared() -> Result<&'static Runtime> {
    SHARED
        .get_or_init(|| {
            Builder::new_multi_thread()
                .enable_all()
                .thread_name("w3w-runtime")
                .build()
                .map_err(|e| error!("Failed to create async runtime: {}", e))
                .ok()
        })
        .as_ref()
        .ok_or_else(|| Error::Config("async runtime unavailable".to_string()))
}

/// Handle of the caller's runtime if there is one, else the shared runtime
pub fn handle() -> Result<Handle> {
    match Handle::try_current() {
        Ok(handle) => Ok(handle),
        Err(_) => Ok(shared()?.handle().clone()),
    }
}

/// Run a future to completion from synchronous code.
///
/// Fails with `InvalidState` when called from inside an async context, where
/// blocking the thread would stall (or panic) the caller's runtime.
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    if Handle::try_current().is_ok() {
        return Err(Error::InvalidState(
            "blocking call made from inside an async runtime; await the async variant instead"
                .to_string(),
        ));
    }
    Ok(shared()?.block_on(future))
}
