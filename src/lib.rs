//! chanmux - channel multiplexing over a single event transport
pub mod codec;
pub mod error;
pub mod message;
pub mod router;
pub mod transport;

pub use codec::{Codec, JsonCodec};
pub use error::{Result, RouterError, TransportError, TransportResult};
pub use message::Event;
pub use message::envelope::Envelope;
pub use message::types::{CONNECT_EVENT, DISCONNECT_EVENT, MESSAGE_EVENT, ResponseId};
pub use router::{
    Dispatch, Handler, LifecycleEvent, RequestHandler, Router, RouterConfig, RouterHandle,
    RouterStats,
};
pub use transport::channel::{ChannelConfig, ChannelTransport};
pub use transport::event::{EventTransport, EventTransportAdapter};
pub use transport::tcp::{TcpConfig, TcpTransport, TcpTransportListener};
pub use transport::{Transport, TransportStats};

#[cfg(feature = "codec-messagepack")]
pub use codec::MessagePackCodec;
#[cfg(feature = "codec-cbor")]
pub use codec::CborCodec;
#[cfg(feature = "ws")]
pub use transport::ws::{WsConfig, WsTransport, WsTransportListener};
