//! HTTP provider
//!
//! Each transfer runs one or two sequential GETs (metadata, then data) over a
//! session opened through an [`HttpConnector`]. Bodies are streamed on the
//! runtime and read back in bounded slices each tick.

mod provider;
mod session;

pub use provider::HttpProvider;
pub use session::{HttpConnector, HttpSession, ReqwestConnector, SessionRead};

#[cfg(test)]
pub(crate) use session::tests::{MockConnector, MockResponse};
