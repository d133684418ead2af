use crate::interfaces::chat_interface::{ChatTransport, CHAT_LINE_TERMINATOR};
use log::{debug, info, warn};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    SessionOpen,
}

/// ChatDispatcher serializes outgoing chat lines through the simulator chat, which only accepts one
/// composed line per open/submit cycle. It is serviced once per telemetry tick, so every message
/// gets its own session: one tick opens the session, the next one transmits.
#[derive(Debug)]
pub struct ChatDispatcher {
    queue: VecDeque<String>,
    state: ChatState,
}

impl Default for ChatDispatcher {
    fn default() -> Self {
        ChatDispatcher {
            queue: VecDeque::new(),
            state: ChatState::Idle,
        }
    }
}

impl ChatDispatcher {
    pub fn new() -> ChatDispatcher {
        ChatDispatcher::default()
    }

    /// enqueue appends a line to the queue, terminating it with a carriage return if required.
    pub fn enqueue(&mut self, line: &str) {
        let mut line = line.to_owned();
        if !line.ends_with(CHAT_LINE_TERMINATOR) {
            line.push(CHAT_LINE_TERMINATOR);
        }
        debug!("Queued chat line {:?}", line);
        self.queue.push_back(line);
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// is_idle returns true if nothing is queued and no chat session is open.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.state == ChatState::Idle
    }

    /// service performs one state transition. Failing transport commands leave the queue untouched
    /// and fall back to Idle, so the line is retried through a fresh session on a later tick.
    pub fn service<T: ChatTransport + ?Sized>(&mut self, transport: &mut T) {
        match (self.state, self.queue.front()) {
            (ChatState::Idle, None) => {}

            (ChatState::Idle, Some(_)) => match transport.open_session() {
                Ok(()) => self.state = ChatState::SessionOpen,
                Err(e) => warn!("Failed to open chat session: {:#}", e),
            },

            (ChatState::SessionOpen, Some(line)) => match transport.transmit(line) {
                Ok(()) => {
                    info!("Sent chat line {:?}", line);
                    self.queue.pop_front();
                    if !self.queue.is_empty() {
                        self.state = ChatState::Idle;
                    }
                }
                Err(e) => {
                    warn!("Failed to send chat line {:?}: {:#}", line, e);
                    self.state = ChatState::Idle;
                }
            },

            (ChatState::SessionOpen, None) => {
                if let Err(e) = transport.cancel_session() {
                    warn!("Failed to cancel chat session: {:#}", e);
                }
                self.state = ChatState::Idle;
            }
        }
    }
}
