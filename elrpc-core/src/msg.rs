// Frame vocabulary. Every payload on the wire is a list whose first two
// elements are the message kind and the uid; the tail depends on the
// kind. Outbound frames are built through the AST so the argument list,
// already encoded at call time, can be spliced in verbatim.

use thiserror::Error;

use crate::error::EncodeError;
use crate::ids::Uid;
use crate::sexp::ast::SExp;
use crate::sexp::encode;
use crate::sexp::value::Value;

/// A frame this peer wants to put on the wire.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// `(call uid "name" args)`, `args` pre-encoded.
    Call {
        uid: Uid,
        method: String,
        args: String,
    },
    /// `(methods uid)` introspection request.
    Methods { uid: Uid },
    /// `(return uid value)` reply to a completed call.
    Return { uid: Uid, value: Value },
    /// `(return-error uid "message")` reply when the handler failed.
    ReturnError { uid: Uid, message: String },
    /// `(epc-error uid "message")` reply when dispatch itself failed.
    EpcError { uid: Uid, message: String },
    /// `(cancel uid)` best-effort abandonment request.
    Cancel { uid: Uid },
}

impl OutboundMessage {
    pub fn uid(&self) -> Uid {
        match self {
            OutboundMessage::Call { uid, .. }
            | OutboundMessage::Methods { uid }
            | OutboundMessage::Return { uid, .. }
            | OutboundMessage::ReturnError { uid, .. }
            | OutboundMessage::EpcError { uid, .. }
            | OutboundMessage::Cancel { uid } => *uid,
        }
    }

    /// Whether a session on this side waits for the reply to this frame.
    pub fn has_local_waiter(&self) -> bool {
        matches!(
            self,
            OutboundMessage::Call { .. } | OutboundMessage::Methods { .. }
        )
    }

    /// Render the frame payload. Fails only when a carried value has no
    /// S-expression form; the caller decides how to downgrade.
    pub fn to_payload(&self) -> Result<String, EncodeError> {
        let ast = match self {
            OutboundMessage::Call { uid, method, args } => SExp::list(vec![
                SExp::symbol("call"),
                SExp::int(uid.to_string()),
                SExp::string(method.clone()),
                SExp::wrapper(args.clone()),
            ]),
            OutboundMessage::Methods { uid } => SExp::list(vec![
                SExp::symbol("methods"),
                SExp::int(uid.to_string()),
            ]),
            OutboundMessage::Return { uid, value } => SExp::list(vec![
                SExp::symbol("return"),
                SExp::int(uid.to_string()),
                SExp::wrapper(encode::encode(value)?),
            ]),
            OutboundMessage::ReturnError { uid, message } => SExp::list(vec![
                SExp::symbol("return-error"),
                SExp::int(uid.to_string()),
                SExp::wrapper(encode::encode(message.as_str())?),
            ]),
            OutboundMessage::EpcError { uid, message } => SExp::list(vec![
                SExp::symbol("epc-error"),
                SExp::int(uid.to_string()),
                SExp::wrapper(encode::encode(message.as_str())?),
            ]),
            OutboundMessage::Cancel { uid } => SExp::list(vec![
                SExp::symbol("cancel"),
                SExp::int(uid.to_string()),
            ]),
        };
        Ok(ast.to_sexp_string())
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    Call {
        uid: Uid,
        name: String,
        args: Vec<Value>,
    },
    Return {
        uid: Uid,
        value: Value,
    },
    ReturnError {
        uid: Uid,
        value: Value,
    },
    EpcError {
        uid: Uid,
        value: Value,
    },
    Methods {
        uid: Uid,
    },
    Cancel {
        uid: Uid,
    },
    /// Kind this peer does not know; logged and skipped.
    Unknown {
        kind: String,
        uid: Uid,
    },
    /// Header was fine but the kind-specific fields were not; answered
    /// with an `epc-error` frame instead of killing the peer.
    Invalid {
        uid: Uid,
        detail: String,
    },
}

/// Header-level decode failure. Any of these is fatal to the peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("invalid message: not a list")]
    NotList,
    #[error("invalid message: missing header")]
    MissingHeader,
    #[error("message type is not string")]
    KindNotString,
    #[error("message uid is not int")]
    UidNotInt,
}

impl IncomingMessage {
    /// Decode a bridged payload value into a frame.
    pub fn parse(value: Value) -> Result<IncomingMessage, MessageError> {
        let mut items = match value {
            Value::List(items) => items,
            _ => return Err(MessageError::NotList),
        };
        if items.len() < 2 {
            return Err(MessageError::MissingHeader);
        }
        let kind = match &items[0] {
            Value::String(s) => s.clone(),
            _ => return Err(MessageError::KindNotString),
        };
        let uid = match &items[1] {
            Value::Int(i) if *i >= 0 => Uid::new(*i as u64),
            _ => return Err(MessageError::UidNotInt),
        };

        let msg = match kind.as_str() {
            "call" => {
                let args_value = if items.len() > 3 {
                    items.swap_remove(3)
                } else {
                    Value::Nil
                };
                let name_value = if items.len() > 2 {
                    items.swap_remove(2)
                } else {
                    Value::Nil
                };
                let name = match name_value {
                    Value::String(s) => s,
                    other => {
                        return Ok(IncomingMessage::Invalid {
                            uid,
                            detail: format!("method name is not string [{}]", other),
                        })
                    }
                };
                let args = match args_value {
                    Value::List(v) => v,
                    Value::Nil => Vec::new(),
                    other => {
                        return Ok(IncomingMessage::Invalid {
                            uid,
                            detail: format!("arguments object is not list [{}]", other),
                        })
                    }
                };
                IncomingMessage::Call { uid, name, args }
            }
            "return" => IncomingMessage::Return {
                uid,
                value: reply_value(items),
            },
            "return-error" => IncomingMessage::ReturnError {
                uid,
                value: reply_value(items),
            },
            "epc-error" => IncomingMessage::EpcError {
                uid,
                value: reply_value(items),
            },
            "methods" => IncomingMessage::Methods { uid },
            "cancel" => IncomingMessage::Cancel { uid },
            _ => IncomingMessage::Unknown { kind, uid },
        };
        Ok(msg)
    }
}

fn reply_value(mut items: Vec<Value>) -> Value {
    if items.len() > 2 {
        items.swap_remove(2)
    } else {
        Value::Nil
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sexp::decode1;

    fn parse_payload(payload: &str) -> IncomingMessage {
        IncomingMessage::parse(decode1(payload).unwrap()).unwrap()
    }

    #[test]
    fn call_frame_round_trip() {
        let msg = OutboundMessage::Call {
            uid: Uid::new(7),
            method: "echo".to_string(),
            args: "(\"test1\")".to_string(),
        };
        let payload = msg.to_payload().unwrap();
        assert_eq!(payload, "(call 7 \"echo\" (\"test1\"))");

        match parse_payload(&payload) {
            IncomingMessage::Call { uid, name, args } => {
                assert_eq!(uid, Uid::new(7));
                assert_eq!(name, "echo");
                assert_eq!(args, vec![Value::String("test1".into())]);
            }
            other => panic!("wrong message: {:?}", other),
        }
    }

    #[test]
    fn call_frame_with_nil_args() {
        match parse_payload("(call 3 \"hello\" nil)") {
            IncomingMessage::Call { args, .. } => assert!(args.is_empty()),
            other => panic!("wrong message: {:?}", other),
        }
    }

    #[test]
    fn return_frame_round_trip() {
        let msg = OutboundMessage::Return {
            uid: Uid::new(7),
            value: Value::Nil,
        };
        assert_eq!(msg.to_payload().unwrap(), "(return 7 nil)");

        match parse_payload("(return 7 \"test1\")") {
            IncomingMessage::Return { uid, value } => {
                assert_eq!(uid, Uid::new(7));
                assert_eq!(value, Value::String("test1".into()));
            }
            other => panic!("wrong message: {:?}", other),
        }
    }

    #[test]
    fn error_frames_render_their_message() {
        let msg = OutboundMessage::ReturnError {
            uid: Uid::new(2),
            message: "Rust error: boom".to_string(),
        };
        assert_eq!(
            msg.to_payload().unwrap(),
            "(return-error 2 \"Rust error: boom\")"
        );

        let msg = OutboundMessage::EpcError {
            uid: Uid::new(9),
            message: "epc error: method not found: name=zz".to_string(),
        };
        assert_eq!(
            msg.to_payload().unwrap(),
            "(epc-error 9 \"epc error: method not found: name=zz\")"
        );
    }

    #[test]
    fn control_frames() {
        assert_eq!(
            OutboundMessage::Methods { uid: Uid::new(4) }.to_payload().unwrap(),
            "(methods 4)"
        );
        assert_eq!(
            OutboundMessage::Cancel { uid: Uid::new(4) }.to_payload().unwrap(),
            "(cancel 4)"
        );
        assert_eq!(parse_payload("(methods 4)"), IncomingMessage::Methods { uid: Uid::new(4) });
        assert_eq!(parse_payload("(cancel 4)"), IncomingMessage::Cancel { uid: Uid::new(4) });
    }

    #[test]
    fn unknown_kind_is_not_fatal() {
        match parse_payload("(gossip 4 1 2 3)") {
            IncomingMessage::Unknown { kind, uid } => {
                assert_eq!(kind, "gossip");
                assert_eq!(uid, Uid::new(4));
            }
            other => panic!("wrong message: {:?}", other),
        }
    }

    #[test]
    fn malformed_headers_are_fatal() {
        let not_list = decode1("42").unwrap();
        assert_eq!(
            IncomingMessage::parse(not_list).unwrap_err(),
            MessageError::NotList
        );

        let short = decode1("(call)").unwrap();
        assert_eq!(
            IncomingMessage::parse(short).unwrap_err(),
            MessageError::MissingHeader
        );

        let bad_kind = decode1("(1 2 3)").unwrap();
        assert_eq!(
            IncomingMessage::parse(bad_kind).unwrap_err(),
            MessageError::KindNotString
        );

        let bad_uid = decode1("(call \"x\" \"echo\" nil)").unwrap();
        assert_eq!(
            IncomingMessage::parse(bad_uid).unwrap_err(),
            MessageError::UidNotInt
        );
    }

    #[test]
    fn bad_call_fields_downgrade_to_invalid() {
        match parse_payload("(call 5 12 nil)") {
            IncomingMessage::Invalid { uid, detail } => {
                assert_eq!(uid, Uid::new(5));
                assert!(detail.contains("method name is not string"));
            }
            other => panic!("wrong message: {:?}", other),
        }
        match parse_payload("(call 5 \"f\" 9)") {
            IncomingMessage::Invalid { detail, .. } => {
                assert!(detail.contains("arguments object is not list"));
            }
            other => panic!("wrong message: {:?}", other),
        }
    }

    #[test]
    fn return_value_encode_failure_surfaces() {
        let msg = OutboundMessage::Return {
            uid: Uid::new(1),
            value: Value::Float(f64::NAN),
        };
        let err = msg.to_payload().unwrap_err();
        assert_eq!(err.to_string(), "sexp encode: unsupported value: NaN");
    }
}
