// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Wire protocol between the script runtime and the bridge.
//
// Tag strings and field names here are a stable contract with the script
// runtime. Operations carry `op`, envelopes carry `t`, and every field is
// camelCase on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{CallId, CallResponse, HandlerId, NodeId, Props};

/// One tree mutation inside an operation batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Operation {
    CreateNode {
        id: NodeId,
        #[serde(rename = "type")]
        component: String,
        #[serde(default)]
        props: Props,
    },
    UpdateProps {
        id: NodeId,
        props: Props,
    },
    InsertChild {
        parent: NodeId,
        child: NodeId,
        /// Position among the parent's children. Omitted or out of range
        /// means "append".
        #[serde(default)]
        index: Option<usize>,
    },
    RemoveChild {
        parent: NodeId,
        child: NodeId,
    },
    DestroyNode {
        id: NodeId,
    },
    AttachEvent {
        id: NodeId,
        event: String,
        /// Script-side handler reference. When absent the bridge uses the
        /// node id, which is enough for runtimes with one handler per node.
        #[serde(default)]
        handler: Option<HandlerId>,
    },
    DetachEvent {
        id: NodeId,
        event: String,
    },
}

impl Operation {
    /// Wire tag of this operation, used in logs and skip reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::CreateNode { .. } => "createNode",
            Operation::UpdateProps { .. } => "updateProps",
            Operation::InsertChild { .. } => "insertChild",
            Operation::RemoveChild { .. } => "removeChild",
            Operation::DestroyNode { .. } => "destroyNode",
            Operation::AttachEvent { .. } => "attachEvent",
            Operation::DetachEvent { .. } => "detachEvent",
        }
    }

    /// The node this operation is primarily about.
    pub fn target(&self) -> NodeId {
        match self {
            Operation::CreateNode { id, .. }
            | Operation::UpdateProps { id, .. }
            | Operation::DestroyNode { id }
            | Operation::AttachEvent { id, .. }
            | Operation::DetachEvent { id, .. } => *id,
            Operation::InsertChild { parent, .. } | Operation::RemoveChild { parent, .. } => {
                *parent
            }
        }
    }
}

/// Messages from the script runtime to the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "camelCase")]
pub enum ScriptEnvelope {
    #[serde(rename_all = "camelCase")]
    Batch {
        #[serde(default)]
        seq: u64,
        /// Destroy every root-level node before applying `ops`. Sent by the
        /// script side when it answers a resync request with a full redraw.
        #[serde(default)]
        reset: bool,
        ops: Vec<Operation>,
    },
    #[serde(rename_all = "camelCase")]
    Call {
        call_id: CallId,
        module: String,
        method: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    Subscribe {
        name: String,
    },
    Unsubscribe {
        name: String,
    },
}

/// Messages from the bridge to the script runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "camelCase")]
pub enum BridgeEnvelope {
    Ready {
        sid: String,
        platform: String,
    },
    NodeEvent {
        node: NodeId,
        event: String,
        handler: HandlerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    GlobalEvent {
        name: String,
        payload: Value,
    },
    #[serde(rename_all = "camelCase")]
    CallResult {
        call_id: CallId,
        #[serde(flatten)]
        response: CallResponse,
    },
    Resync {
        seq: u64,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_create_node_with_type_field() {
        let op: Operation = serde_json::from_value(json!({
            "op": "createNode",
            "id": 2,
            "type": "text",
            "props": { "text": "hi" }
        }))
        .expect("decode createNode");

        match op {
            Operation::CreateNode {
                id,
                component,
                props,
            } => {
                assert_eq!(id, NodeId(2));
                assert_eq!(component, "text");
                assert_eq!(props["text"], "hi");
            }
            other => panic!("expected createNode, got {other:?}"),
        }
    }

    #[test]
    fn create_node_props_default_to_empty() {
        let op: Operation =
            serde_json::from_value(json!({ "op": "createNode", "id": 1, "type": "container" }))
                .expect("decode");
        assert!(matches!(op, Operation::CreateNode { props, .. } if props.is_empty()));
    }

    #[test]
    fn insert_child_index_is_optional() {
        let op: Operation =
            serde_json::from_value(json!({ "op": "insertChild", "parent": 1, "child": 2 }))
                .expect("decode");
        assert_eq!(
            op,
            Operation::InsertChild {
                parent: NodeId(1),
                child: NodeId(2),
                index: None,
            }
        );
        assert_eq!(op.kind(), "insertChild");
        assert_eq!(op.target(), NodeId(1));
    }

    #[test]
    fn unknown_operation_tag_is_rejected() {
        let result: Result<Operation, _> =
            serde_json::from_value(json!({ "op": "teleportNode", "id": 1 }));
        assert!(result.is_err());
    }

    #[test]
    fn decodes_batch_envelope() {
        let envelope: ScriptEnvelope = serde_json::from_value(json!({
            "t": "batch",
            "seq": 4,
            "ops": [
                { "op": "createNode", "id": 1, "type": "container" },
                { "op": "attachEvent", "id": 1, "event": "press", "handler": 9 }
            ]
        }))
        .expect("decode batch");

        match envelope {
            ScriptEnvelope::Batch { seq, reset, ops } => {
                assert_eq!(seq, 4);
                assert!(!reset);
                assert_eq!(ops.len(), 2);
                assert_eq!(
                    ops[1],
                    Operation::AttachEvent {
                        id: NodeId(1),
                        event: "press".into(),
                        handler: Some(HandlerId(9)),
                    }
                );
            }
            other => panic!("expected batch, got {other:?}"),
        }
    }

    #[test]
    fn decodes_call_envelope_with_camel_case_id() {
        let envelope: ScriptEnvelope = serde_json::from_value(json!({
            "t": "call",
            "callId": 12,
            "module": "Storage",
            "method": "get",
            "args": ["token"]
        }))
        .expect("decode call");

        assert_eq!(
            envelope,
            ScriptEnvelope::Call {
                call_id: CallId(12),
                module: "Storage".into(),
                method: "get".into(),
                args: vec![json!("token")],
            }
        );
    }

    #[test]
    fn encodes_call_result_flat() {
        let value = serde_json::to_value(BridgeEnvelope::CallResult {
            call_id: CallId(3),
            response: CallResponse::err("boom"),
        })
        .expect("encode");
        assert_eq!(value, json!({ "t": "callResult", "callId": 3, "error": "boom" }));
    }

    #[test]
    fn encodes_node_event_without_payload() {
        let value = serde_json::to_value(BridgeEnvelope::NodeEvent {
            node: NodeId(5),
            event: "press".into(),
            handler: HandlerId(2),
            payload: None,
        })
        .expect("encode");
        assert_eq!(
            value,
            json!({ "t": "nodeEvent", "node": 5, "event": "press", "handler": 2 })
        );
    }
}
