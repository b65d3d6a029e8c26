//! HTTP service for stash.
//!
//! A thin axum layer over the storage core: it decodes multipart uploads,
//! runs them through the upload policy, and maps every store outcome to a
//! fixed status code and JSON message.
//!
//! | Method   | Path          | Success                                   |
//! |----------|---------------|-------------------------------------------|
//! | `POST`   | `/upload`     | `{message, file, metadata}`               |
//! | `GET`    | `/files`      | `{files: [key, ...]}`                     |
//! | `GET`    | `/files/:key` | raw bytes, `Content-Disposition: inline`  |
//! | `DELETE` | `/files/:key` | `{message}`                               |
//! | `GET`    | `/objects`    | `{files: [entry, ...]}` with metadata     |
//! | `GET`    | `/health`     | `{status: "ok"}`                          |

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use server::StashServer;
