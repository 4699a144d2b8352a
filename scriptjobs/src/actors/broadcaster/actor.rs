use super::messages::{Message, Stream};
use crate::events::Output;
use crate::types::OutputBlob;

use tokio::select;
use tokio::sync::mpsc;

pub struct Actor {
    inbox: mpsc::UnboundedReceiver<Message>,
    output_rx: mpsc::UnboundedReceiver<Output>,
    output_buffer: Vec<Output>,
    subscribers: Vec<(Stream, mpsc::UnboundedSender<OutputBlob>)>,
    output_pending: bool,
}

impl Actor {
    pub fn spawn(
        inbox: mpsc::UnboundedReceiver<Message>,
        output_rx: mpsc::UnboundedReceiver<Output>,
    ) {
        let actor = Actor {
            inbox,
            output_rx,
            output_buffer: Vec::new(),
            subscribers: Vec::new(),
            output_pending: true,
        };
        tokio::spawn(async move { actor.run().await });
    }

    async fn run(mut self) {
        loop {
            select! {
                Some(msg) = self.inbox.recv() => {
                    match msg {
                        Message::Subscribe { stream, subscriber } => self.subscribe(stream, subscriber),
                    }
                }
                maybe_output = self.output_rx.recv(), if self.output_pending => {
                    match maybe_output {
                        Some(output) => {
                            let blob = blob_of(&output).clone();
                            self.subscribers.retain(|(stream, sub)| {
                                // only retain subscribers who have not dropped
                                !wants(*stream, &output) || sub.send(blob.clone()).is_ok()
                            });
                            self.output_buffer.push(output);
                        }
                        None => {
                            // dropping the senders ends every subscriber's stream
                            self.subscribers.clear();
                            self.output_pending = false;
                        }
                    }
                }
                // no handles left and the output is finished
                else => break,
            }
        }
    }

    fn subscribe(&mut self, stream: Stream, subscriber: mpsc::UnboundedSender<OutputBlob>) {
        for output in self.output_buffer.iter().filter(|output| wants(stream, output)) {
            if subscriber.send(blob_of(output).clone()).is_err() {
                return;
            }
        }
        if self.output_pending {
            self.subscribers.push((stream, subscriber));
        }
    }
}

fn wants(stream: Stream, output: &Output) -> bool {
    matches!(
        (stream, output),
        (Stream::All, _) | (Stream::Stdout, Output::Stdout(_)) | (Stream::Stderr, Output::Stderr(_))
    )
}

fn blob_of(output: &Output) -> &OutputBlob {
    match output {
        Output::Stdout(blob) | Output::Stderr(blob) => blob,
    }
}
