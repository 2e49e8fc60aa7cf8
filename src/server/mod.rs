pub mod websocket;

use crate::conversation::ConversationController;
use std::error::Error;

pub struct Server {
    addr: String,
    controller: ConversationController,
    connection_rate: u32,
}

impl Server {
    pub fn new(addr: String, controller: ConversationController, connection_rate: u32) -> Self {
        Self {
            addr,
            controller,
            connection_rate,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        websocket::start_ws_server(
            &self.addr,
            self.controller.clone(),
            self.connection_rate,
        ).await
    }
}
