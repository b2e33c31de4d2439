//! Line-oriented console view for the client binary.

use std::future::Future;

use parley_session::{MessageKind, View};
use tokio::sync::watch;

/// Prints chat lines to stdout. Input is read by the binary.
pub struct ConsoleView {
    quit: watch::Sender<bool>,
}

impl ConsoleView {
    pub fn new() -> Self {
        Self {
            quit: watch::channel(false).0,
        }
    }
}

impl Default for ConsoleView {
    fn default() -> Self {
        Self::new()
    }
}

impl View for ConsoleView {
    fn view_room(&self, room_id: &str) {
        println!("*** room {room_id}");
    }

    fn view_message(&self, kind: MessageKind, from: &str, text: &str) {
        match kind {
            MessageKind::Chat => println!("<{from}> {text}"),
            MessageKind::Info => println!("*** {text}"),
            MessageKind::Error => println!("!!! {text}"),
        }
    }

    fn update_peers(&self, peers: &[String]) {
        println!("*** here: {}", peers.join(", "));
    }

    fn show(&self) -> impl Future<Output = ()> + Send {
        let mut quit = self.quit.subscribe();
        async move {
            let _ = quit.wait_for(|quit| *quit).await;
        }
    }

    fn quit(&self) {
        self.quit.send_replace(true);
    }
}
