mod error;

pub mod credential;
pub mod redact;
pub mod signature;
pub mod usersig;

pub use credential::Credential;
pub use error::{
    AsrError, ERR_ALREADY_STARTED, ERR_AUTH_FAILED, ERR_CONNECT_FAILED, ERR_INVALID_PARAM,
    ERR_NOT_STARTED, ERR_READ_FAILED, ERR_SERVER_ERROR, ERR_TIMEOUT, ERR_WRITE_FAILED, ErrorKind,
    Result,
};
pub use redact::redact_url;
pub use signature::SignatureParams;
pub use usersig::{TlsSigV2, TokenSigner, gen_user_sig};
