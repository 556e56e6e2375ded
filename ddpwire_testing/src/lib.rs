//! Test utilities for `ddpwire`.
//!
//! [`MockServer`] accepts real TCP connections, performs the server half of
//! the WebSocket upgrade and hands each client to the test as a
//! [`MockPeer`] that speaks DDP as JSON values. [`LoggerHandle`] serialises
//! access to captured log records.
//!
//! ```rust,no_run
//! use ddpwire::Session;
//! use ddpwire_testing::MockServer;
//!
//! # async fn example() -> std::io::Result<()> {
//! let server = MockServer::bind().await?;
//! let url = server.url();
//! let peer = tokio::spawn(async move {
//!     let mut peer = server.accept().await.expect("client connects");
//!     peer.handshake("s1").await;
//!     peer
//! });
//! let session = Session::connect(&url).await.expect("session");
//! # drop((session, peer));
//! # Ok(())
//! # }
//! ```

mod logging;
mod mock_server;

pub use logging::{LoggerHandle, logger};
pub use mock_server::{MockPeer, MockServer, RECV_TIMEOUT};
