//! # Events Module
//!
//! Progress reporting for scan sessions and comparison runs.
//!
//! ## Design
//! The core library emits events through channels so the CLI (or any other
//! front end) can subscribe and render progress without the core knowing
//! about terminals.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         if let Event::Scan(ScanEvent::Progress(p)) = event {
//!             println!("{} files processed", p.files_processed);
//!         }
//!     }
//! });
//!
//! orchestrator.run_with_events(&request, &sender)?;
//! ```

mod channel;
mod types;

pub use channel::{null_sender, EventChannel, EventReceiver, EventSender};
pub use types::*;
