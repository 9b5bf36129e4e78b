//! The Hello service: a small interface for smoke-testing a deployment.

use rpcprims_rpc::{Result, ServiceExport};
use serde::{Deserialize, Serialize};

/// Implementation reference the demo provider registers.
pub const HELLO_REF: &str = "helloService";

/// Greeting payload of [`hello::Service::say_hi`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hi {
    pub user_name: String,
    pub say_msg: String,
}

rpcprims_rpc::service! {
    /// Greeting service.
    pub mod hello("rpcprims.demo.HelloService") {
        /// Fixed greeting.
        async fn hi() -> String;
        /// Echo `msg` back.
        async fn say(msg: String) -> String;
        /// `"{user_name} say: {say_msg}"`.
        async fn say_hi(hi: Hi) -> String;
    }
}

/// Local implementation of [`hello::Service`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Greeter;

#[rpcprims_rpc::async_trait]
impl hello::Service for Greeter {
    async fn hi(&self) -> Result<String> {
        Ok("hi rpcprims".to_string())
    }

    async fn say(&self, msg: String) -> Result<String> {
        Ok(msg)
    }

    async fn say_hi(&self, hi: Hi) -> Result<String> {
        Ok(format!("{} say: {}", hi.user_name, hi.say_msg))
    }
}

/// Dispatch table of [`Greeter`].
pub fn greeter_export() -> ServiceExport {
    hello::export(Greeter)
}
