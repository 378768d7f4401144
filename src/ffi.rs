//! Raw FFI bindings to the C shim in `csrc/rankx.c`.
//!
//! These are low-level unsafe functions. Use [`MpiTransport`](crate::transport::MpiTransport).

use std::os::raw::{c_char, c_double, c_int, c_void};

/// Receive-side codes produced by the shim itself (`RANKX_ERR_*`).
pub const RANKX_ERR_DATATYPE: c_int = -1;
pub const RANKX_ERR_COUNT: c_int = -2;
pub const RANKX_ERR_TAG: c_int = -3;

extern "C" {
    pub fn rankx_init_thread(required: c_int, provided: *mut c_int) -> c_int;
    pub fn rankx_finalize() -> c_int;
    pub fn rankx_initialized(flag: *mut c_int) -> c_int;
    pub fn rankx_finalized(flag: *mut c_int) -> c_int;

    pub fn rankx_comm_rank(rank: *mut i32) -> c_int;
    pub fn rankx_comm_size(size: *mut i32) -> c_int;

    pub fn rankx_ssend(
        buf: *const c_void,
        count: i64,
        datatype_tag: i32,
        dest: i32,
        tag: i32,
    ) -> c_int;

    pub fn rankx_recv(
        buf: *mut c_void,
        count: i64,
        datatype_tag: i32,
        source: i32,
        tag: i32,
        actual_source: *mut i32,
        actual_tag: *mut i32,
        actual_count: *mut i64,
    ) -> c_int;

    pub fn rankx_error_string(code: c_int, message: *mut c_char, len: *mut i32) -> c_int;
    pub fn rankx_get_version(version: *mut c_char, len: *mut i32) -> c_int;
    pub fn rankx_get_processor_name(name: *mut c_char, len: *mut i32) -> c_int;
    pub fn rankx_wtime() -> c_double;
}
