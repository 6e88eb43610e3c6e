//! # crashsym-protocol
//!
//! Wire types exchanged with the services crashsym talks to:
//!
//! - the bulk symbolication service (`/symbolicate`, `/minidump`, `/requests/{id}`)
//! - the system symbol lookup service (`/lookup`)
//!
//! The types are plain `serde` structs so hosts can build payloads without
//! pulling in the processing core.

pub mod frame;
pub mod hex;
pub mod image;
pub mod symbolicator;
pub mod symbolserver;
pub mod verbatim;

pub use frame::{FrameStatus, FrameTrust, SymbolCandidate, SymbolicatedFrame};
pub use hex::{parse_addr, HexValue, ParseAddrError};
pub use image::{CompleteObjectInfo, ObjectFileStatus, RawImage};
pub use symbolicator::{
    CompleteStacktrace, CompletedResponse, RegisterMap, RequestFrame, RequestId, RequestStacktrace,
    SymbolicationRequest, SymbolicationResponse,
};
pub use symbolserver::{SystemSymbolMatch, SystemSymbolQuery, SystemSymbolRequest, SystemSymbolResponse};
pub use verbatim::Verbatim;
