#![doc(html_root_url = "https://docs.rs/ddpwire/latest")]
//! Public API for the `ddpwire` library.
//!
//! This crate provides an asynchronous client for the Distributed Data
//! Protocol (DDP): a WebSocket transport, the DDP message model, a
//! correlation registry for method calls and subscriptions, and a local
//! document cache kept in sync with server publications.
//!
//! Most applications only need [`Session`]:
//!
//! ```no_run
//! use ddpwire::{Selector, Session};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::connect("ws://localhost:3000/websocket").await?;
//! let lists = session.collection("lists");
//! session.subscribe("lists", Vec::new())?.ready().await?;
//! for doc in lists.find(Selector::All).fetch() {
//!     println!("{}: {:?}", doc.id(), doc.get("name"));
//! }
//! # Ok(())
//! # }
//! ```

pub mod byte_order;
pub mod cache;
pub mod codec;
pub mod frame;
pub mod message;
pub mod message_assembler;
pub mod metrics;
pub mod registry;
pub mod rewind_stream;
pub mod session;
pub mod transport;

pub use cache::{
    Collection,
    CollectionEvent,
    CollectionObserver,
    CollectionStore,
    Cursor,
    Document,
    ObserveCallbacks,
    ObserveHandle,
    Selector,
};
pub use message::{DdpMessage, ErrorCode, MethodError, WireError};
pub use metrics::{CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, MESSAGES_TOTAL, RECONNECTS_TOTAL};
pub use registry::{CallError, MethodCall, Subscription, SubscriptionError, SubscriptionStatus};
pub use session::{ConnectionState, Session, SessionBuilder, SessionError, SessionEvent};
pub use transport::{TransportError, WsUrl};
