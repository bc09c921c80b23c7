//! Map-reduce aggregation (spec §4.6). A `SUBMIT_REDUCE_JOB` job carries a
//! [`crate::types::job::ReduceState`] instead of going straight to clients:
//! `WORK_DATA` chunks accumulate here in arrival order, and `WORK_COMPLETE`
//! joins them into a single payload resubmitted to the reducer function.

use bytes::{Bytes, BytesMut};

/// Joins accumulated mapper chunks with a single NUL byte between them. The
/// wire protocol has no other self-delimiting separator for an arbitrary
/// sequence of opaque byte chunks, and NUL already terminates every other
/// argument in the binary frame, so reusing it keeps the reduce payload
/// parseable the same way as any other argument list.
pub fn join_chunks(chunks: &[Bytes]) -> Bytes {
    let mut out = BytesMut::with_capacity(chunks.iter().map(|c| c.len() + 1).sum());
    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 {
            out.extend_from_slice(b"\0");
        }
        out.extend_from_slice(chunk);
    }
    out.freeze()
}
