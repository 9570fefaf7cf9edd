//! Test peers and fixtures for exercising `agentlink` over real sockets.
//!
//! [`EchoAgent`] listens on a loopback port and speaks the bus protocol of
//! [`agentlink::transport::frame`]. Commands received on a sending link are
//! answered on the client's reply link according to the agent's
//! [`AgentMode`].
//!
//! Tests that need no sockets can use the scripted in-memory transport
//! re-exported from [`agentlink::test_helpers`].
//!
//! ```rust,no_run
//! use agentlink::CommandClient;
//! use agentlink_testing::{AgentMode, EchoAgent};
//!
//! # async fn example() -> std::io::Result<()> {
//! let agent = EchoAgent::spawn(AgentMode::Echo).await?;
//! let client = CommandClient::builder(agent.url(), "$management").build();
//! client.start();
//! # Ok(())
//! # }
//! ```

pub mod echo_agent;
pub mod logging;

pub use echo_agent::{AgentMode, EchoAgent, EchoAgentBuilder};
pub use agentlink::test_helpers::{MemoryBus, MemoryConnector, RemoteAgent, memory_transport};
pub use logging::{LoggerHandle, logger};
