//! XML-RPC provider for avatar storage
//!
//! Ids look like `http://host/path/avatar/<hash>`. The call goes to the same
//! URL with `/avatar/` replaced by `/xmlrpc/`, and the reply carries the
//! asset as a base64 `binaries` member.

mod pool;
mod provider;
mod transport;
mod xmlrpc;

pub use provider::RpcProvider;
pub use transport::{ReqwestRpcTransport, RpcTransport};
pub use xmlrpc::{RpcError, RpcValue};
