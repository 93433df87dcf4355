//! Inbound-to-backend request forwarding state.
//!
//! # Responsibilities
//! - Hold inbound bytes that arrive before the backend connection is ready
//! - Flush them exactly once, in arrival order, when the connection comes up
//! - Remember an early end-of-request and replay it after the flush
//! - Emit end-of-request at most once
//!
//! The state machine is pure: it returns the writes to perform and the
//! session's pump task carries them out.

use bytes::{Bytes, BytesMut};

use crate::net::connection::ConnectionState;

/// A write the session must perform on the backend request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardAction {
    Write(Bytes),
    End,
}

/// Buffering and end-of-request bookkeeping for one session.
#[derive(Debug)]
pub struct RequestForwarder {
    state: ConnectionState,
    buffer: BytesMut,
    end_requested: bool,
}

impl Default for RequestForwarder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestForwarder {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Unconnected,
            buffer: BytesMut::new(),
            end_requested: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Bytes held back waiting for the connection.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn end_requested(&self) -> bool {
        self.end_requested
    }

    /// A connection attempt is under way.
    pub fn connecting(&mut self) {
        if self.state == ConnectionState::Unconnected {
            self.state = ConnectionState::Connecting;
        }
    }

    /// An inbound chunk arrived.
    pub fn on_chunk(&mut self, chunk: Bytes) -> Vec<ForwardAction> {
        match self.state {
            ConnectionState::Unconnected | ConnectionState::Connecting => {
                self.buffer.extend_from_slice(&chunk);
                Vec::new()
            }
            ConnectionState::Connected => {
                let mut actions = Vec::with_capacity(2);
                if let Some(pending) = self.take_buffer() {
                    actions.push(ForwardAction::Write(pending));
                }
                if !chunk.is_empty() {
                    actions.push(ForwardAction::Write(chunk));
                }
                actions
            }
            ConnectionState::Ended => {
                tracing::debug!(bytes = chunk.len(), "Inbound data after end of request dropped");
                Vec::new()
            }
        }
    }

    /// The inbound stream ended.
    pub fn on_end(&mut self) -> Vec<ForwardAction> {
        match self.state {
            ConnectionState::Unconnected | ConnectionState::Connecting => {
                self.end_requested = true;
                Vec::new()
            }
            ConnectionState::Connected => {
                let mut actions = Vec::with_capacity(2);
                if let Some(pending) = self.take_buffer() {
                    actions.push(ForwardAction::Write(pending));
                }
                self.state = ConnectionState::Ended;
                actions.push(ForwardAction::End);
                actions
            }
            ConnectionState::Ended => Vec::new(),
        }
    }

    /// The backend connection is ready.
    pub fn on_connected(&mut self) -> Vec<ForwardAction> {
        if !matches!(self.state, ConnectionState::Unconnected | ConnectionState::Connecting) {
            return Vec::new();
        }
        self.state = ConnectionState::Connected;

        let mut actions = Vec::with_capacity(2);
        if let Some(pending) = self.take_buffer() {
            tracing::debug!(bytes = pending.len(), "Flushing buffered request body");
            actions.push(ForwardAction::Write(pending));
        }
        if self.end_requested {
            tracing::debug!("Inbound already ended, ending backend request");
            self.state = ConnectionState::Ended;
            actions.push(ForwardAction::End);
        }
        actions
    }

    fn take_buffer(&mut self) -> Option<Bytes> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer.split().freeze())
        }
    }
}
