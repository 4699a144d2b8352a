mod actor;
mod messages;
use crate::{events::Output, types::OutputBlob};
use actor::Actor;
use messages::Message;
pub use messages::Stream;

use tokio::sync::mpsc::{self, UnboundedReceiver};

/// Fans a process's output out to any number of subscribers.
///
/// Everything received is buffered, so a subscriber that arrives late still gets the
/// full output from the start. A subscriber's channel closes once the process has
/// closed both of its pipes.
#[derive(Clone)]
pub struct BroadcasterHandle {
    sender: mpsc::UnboundedSender<Message>,
}

impl BroadcasterHandle {
    pub fn spawn(output_rx: UnboundedReceiver<Output>) -> Self {
        let (sender, inbox) = mpsc::unbounded_channel();
        Actor::spawn(inbox, output_rx);
        Self { sender }
    }

    pub fn subscribe(&self, stream: Stream) -> UnboundedReceiver<OutputBlob> {
        let (subscriber, receiver) = mpsc::unbounded_channel();
        let _ = self.sender.send(Message::Subscribe { stream, subscriber });
        receiver
    }
}
