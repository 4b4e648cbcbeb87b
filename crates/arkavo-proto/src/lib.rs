//! Wire protocol for the Arkavo secure-messaging transport core.
//!
//! Every frame on the Key Access Service channel is a single type byte
//! followed by an opaque payload:
//!
//! ```text
//! [type tag: 1 byte][payload: N bytes]
//! ```
//!
//! The tag fully determines how the payload is parsed. Unknown tags are
//! representable (`Frame` keeps the raw byte) so the decoder never fails
//! on traffic from newer peers - callers drop what they do not recognize.
//!
//! Stream-addressed payloads (tag [`MessageType::Message`]) carry a fixed
//! 32-byte stream identifier before the application bytes:
//!
//! ```text
//! [type tag: 1 byte][stream id: 32 bytes][payload: N bytes]
//! ```

mod errors;
mod frame;
mod rewrap;
mod stream;

pub use errors::{ProtocolError, Result};
pub use frame::{Frame, MessageType};
pub use rewrap::{REWRAP_ID_SIZE, RewrapRequest, RewrappedKey, rewrap_request_id};
pub use stream::{STREAM_ID_SIZE, StreamId};
