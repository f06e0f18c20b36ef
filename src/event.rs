use std::io::BufRead;
use tokio::sync::{mpsc, watch};

/// Watch-mode events
#[derive(Debug)]
pub enum Event {
  /// A line typed on stdin
  Input(String),
  /// The cache published a new snapshot
  Changed,
  /// Stdin was closed
  Eof,
}

/// Event handler that merges stdin lines and cache revision changes
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  pub fn new(mut revisions: watch::Receiver<u64>) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // Stdin gets a plain thread: a blocked read must not hold up runtime shutdown
    let input_tx = tx.clone();
    std::thread::spawn(move || {
      for line in std::io::stdin().lock().lines() {
        match line {
          Ok(line) => {
            if input_tx.send(Event::Input(line)).is_err() {
              return;
            }
          }
          Err(_) => break,
        }
      }
      let _ = input_tx.send(Event::Eof);
    });

    tokio::spawn(async move {
      while revisions.changed().await.is_ok() {
        if tx.send(Event::Changed).is_err() {
          break;
        }
      }
    });

    Self { rx }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
