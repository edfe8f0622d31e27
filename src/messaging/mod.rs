// Messaging module - Topics, subscriber registry and inbound routing
pub mod event;
pub mod registry;
pub mod router;

pub use event::{ConnectionSignal, ConnectionStatus, Topic};
pub use registry::{DispatchOutcome, EventRegistry, SubscriberFault, SubscriptionId};
pub use router::{MessageRouter, RouteOutcome};
