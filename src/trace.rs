//! W3C trace-context identifiers.
//!
//! One [`TraceParent`] per request: parsed from the inbound `traceparent`
//! header, or generated when the header is missing or malformed. tsu does
//! not build span trees or make sampling decisions. It forwards a single
//! identifier pair so logs from every hop of a call chain can be joined.
//!
//! ```text
//! 00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01
//! ^^ ^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^ ^^^^^^^^^^^^^^^^ ^^
//! |  trace id (16 bytes)              parent id (8)    flags
//! version
//! ```

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use uuid::Uuid;

/// Inbound header carrying the caller's trace context.
pub const TRACEPARENT: &str = "traceparent";

/// Outbound header set when tsu had to mint a new trace context.
pub const TRACERESPONSE: &str = "traceresponse";

const TRACE_ID_LEN: usize = 16;
const PARENT_ID_LEN: usize = 8;

// Bytes of the trace id taken from the time-ordered UUIDv7; the rest are
// borrowed from the tail of the parent id.
const ORDERED_PREFIX_LEN: usize = 12;

/// The `traceparent` header could not be parsed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("invalid_trace_parent")]
pub struct InvalidTraceParent;

/// 16-byte trace identifier. Formats as 32 lowercase hex digits.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct TraceId(pub [u8; TRACE_ID_LEN]);

/// 8-byte parent (span) identifier. Formats as 16 lowercase hex digits.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct ParentId(pub [u8; PARENT_ID_LEN]);

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Display for ParentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// A request's position in a distributed call chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TraceParent {
    pub version: u8,
    pub flags: u8,
    pub trace_id: TraceId,
    pub parent_id: ParentId,
}

impl TraceParent {
    /// Parses `vv-<32 hex>-<16 hex>-ff`. Hex is accepted in either case.
    pub fn parse(header: &str) -> Result<Self, InvalidTraceParent> {
        let header = header.to_ascii_lowercase();
        let mut parts = header.split('-');

        let (Some(version), Some(trace_id), Some(parent_id), Some(flags), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(InvalidTraceParent);
        };

        Ok(Self {
            version: decode::<1>(version)?[0],
            trace_id: TraceId(decode(trace_id)?),
            parent_id: ParentId(decode(parent_id)?),
            flags: decode::<1>(flags)?[0],
        })
    }

    /// Mints a fresh identifier pair.
    ///
    /// The parent id is 8 random bytes. The trace id starts with the first
    /// 12 bytes of a UUIDv7, so ids sort roughly by creation time across
    /// every process that generates them, and ends with the last 4 bytes of
    /// the parent id it was born with.
    pub fn generate() -> Self {
        let mut parent_id = [0u8; PARENT_ID_LEN];
        rand::thread_rng().fill_bytes(&mut parent_id);

        let mut trace_id = [0u8; TRACE_ID_LEN];
        trace_id[..ORDERED_PREFIX_LEN]
            .copy_from_slice(&Uuid::now_v7().as_bytes()[..ORDERED_PREFIX_LEN]);
        trace_id[ORDERED_PREFIX_LEN..]
            .copy_from_slice(&parent_id[PARENT_ID_LEN - (TRACE_ID_LEN - ORDERED_PREFIX_LEN)..]);

        Self {
            version: 0,
            flags: 0,
            trace_id: TraceId(trace_id),
            parent_id: ParentId(parent_id),
        }
    }

    /// Parses the inbound header if it is usable, otherwise generates a new
    /// context. The flag reports whether generation happened, i.e. whether
    /// the caller has to be told via `traceresponse`.
    pub(crate) fn resolve(header: Option<&str>) -> (Self, bool) {
        match header.map(Self::parse) {
            Some(Ok(parent)) => (parent, false),
            _ => (Self::generate(), true),
        }
    }
}

/// Fixed-width hex field. The width check comes first: `hex` would accept
/// any even length.
fn decode<const N: usize>(field: &str) -> Result<[u8; N], InvalidTraceParent> {
    if field.len() != N * 2 {
        return Err(InvalidTraceParent);
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(field, &mut out).map_err(|_| InvalidTraceParent)?;
    Ok(out)
}

impl FromStr for TraceParent {
    type Err = InvalidTraceParent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TraceParent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}-{}-{}-{:02x}",
            self.version, self.trace_id, self.parent_id, self.flags
        )
    }
}
