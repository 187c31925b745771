//! Crosstalk core: LAN chat session coordination, message codec and translation pipeline.
//! Host-driven: no I/O; host passes commands and events and receives actions.

pub mod codec;
pub mod identity;
pub mod message;
pub mod protocol;
pub mod sequencer;
pub mod session;
pub mod state;
pub mod store;
pub mod translation;
pub mod wire;

pub use codec::{decode_message, encode_message, CodecError};
pub use identity::{PeerId, Role};
pub use message::{Message, MessageId};
pub use protocol::{Frame, PROTOCOL_VERSION, SERVICE_TYPE};
pub use sequencer::DeliveryOrder;
pub use session::{Action, ChatSession, PeerConnection, SessionEvent};
pub use state::SessionState;
pub use store::MessageStore;
pub use translation::{TranslationClient, TranslationError, TranslationPipeline};
pub use wire::{decode_frame, encode_frame, FrameDecodeError, FrameEncodeError};
