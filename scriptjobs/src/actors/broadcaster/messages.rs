use crate::types::OutputBlob;
use tokio::sync::mpsc;

/// Which of a process's output streams a subscriber wants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
    All,
}

#[derive(Debug)]
pub enum Message {
    Subscribe {
        stream: Stream,
        subscriber: mpsc::UnboundedSender<OutputBlob>,
    },
}
