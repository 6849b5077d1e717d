// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test builders shared with downstream crates (behind `test-support`).

#![allow(clippy::unwrap_used)]

use crate::document::{Frame, FrameState, OperationDoc};
use crate::id::{CallId, OperationId, ParticipantId};
use chrono::{DateTime, TimeZone, Utc};

/// Millisecond-precision timestamp helper for fixtures.
pub fn ts(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap()
}

/// Builder for operation documents in tests.
pub struct DocBuilder {
    doc: OperationDoc,
}

impl DocBuilder {
    pub fn new(operation_id: &str, initiator: &str, start: DateTime<Utc>) -> Self {
        Self {
            doc: OperationDoc::new(
                OperationId::new(operation_id),
                ParticipantId::new(initiator),
                start,
            ),
        }
    }

    pub fn frame(mut self, participant: &str, call_id: &str, at: DateTime<Utc>) -> Self {
        self.doc
            .push_frame(Frame::new(
                ParticipantId::new(participant),
                CallId::new(call_id),
                std::process::id(),
                at,
            ))
            .unwrap();
        self
    }

    pub fn frame_in_state(
        mut self,
        participant: &str,
        call_id: &str,
        at: DateTime<Utc>,
        state: FrameState,
    ) -> Self {
        self = self.frame(participant, call_id, at);
        self.doc.frame_mut(&CallId::new(call_id)).unwrap().state = state;
        self
    }

    pub fn supervised_frame(
        mut self,
        participant: &str,
        call_id: &str,
        at: DateTime<Utc>,
        supervisor: &str,
    ) -> Self {
        self = self.frame(participant, call_id, at);
        let frame = self.doc.frame_mut(&CallId::new(call_id)).unwrap();
        frame.supervisor_id = Some(supervisor.to_string());
        self
    }

    pub fn build(self) -> OperationDoc {
        self.doc
    }
}
