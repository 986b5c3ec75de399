// EPC core: everything that is independent of a live connection.
// The S-expression codec (lexer, parser, AST, value bridge, encoder),
// the frame vocabulary shared by both peer roles, and uid allocation.

pub mod error;
pub mod ids;
pub mod msg;
pub mod sexp;

pub use error::EncodeError;
pub use ids::{next_uid, Uid, UidAllocator};
pub use msg::{IncomingMessage, MessageError, OutboundMessage};
pub use sexp::ast::SExp;
pub use sexp::encode::{encode, encode_record, string_literal, symbol_literal, CallArgs, ToSexp};
pub use sexp::parser::{parse, ParseError};
pub use sexp::value::{coerce, CoerceError, ParamType, Value};
pub use sexp::{decode, decode1};
