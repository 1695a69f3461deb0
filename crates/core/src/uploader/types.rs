//! Types for the uploader module.

use serde::{Deserialize, Serialize};

/// Receipt for a successfully uploaded media item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Identifier assigned by the destination service.
    pub remote_id: String,
}
