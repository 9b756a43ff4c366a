//! Remote backends the compute handlers talk to.
//!
//! Each backend is a trait so handlers can be exercised against in-memory
//! fakes; the `Http*` types are the reqwest-based production clients.

pub mod columnar;
pub mod credentials;
pub mod geometry;
pub mod raster;

pub use columnar::{ColumnarBackend, HttpColumnarBackend};
pub use credentials::{
    AccessToken, ClientCredentialsProvider, CredentialLease, ScopedCredentials,
    StaticTokenProvider, TokenProvider,
};
pub use geometry::{default_boundaries, BoundaryTable, ColumnarGeometryResolver, GeometryResolver};
pub use raster::{HttpRasterService, RasterService, ZonalRequest};

use reqwest::Response;

use crate::error::{ComputeError, ComputeResult};

/// Longest response body excerpt kept in error details.
const DETAIL_LIMIT: usize = 512;

/// Turn a non-success response into [`ComputeError::Backend`].
pub(crate) async fn check_status(backend: &str, response: Response) -> ComputeResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut detail = response.text().await.unwrap_or_default();
    if detail.len() > DETAIL_LIMIT {
        let mut cut = DETAIL_LIMIT;
        while !detail.is_char_boundary(cut) {
            cut -= 1;
        }
        detail.truncate(cut);
    }

    Err(ComputeError::Backend {
        backend: backend.to_string(),
        status: status.as_u16(),
        detail,
    })
}
