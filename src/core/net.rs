use serde_json::Value;
use url::Url;

use crate::core::PollError;
use crate::core::client::RawResponse;

/// A decoded JSON payload plus the optional variant diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub payload: Value,
    /// Value of the first response header whose name contains `variant`
    /// (case-insensitive), if any.
    pub variant: Option<String>,
}

/// Map a raw response to a payload: non-2xx becomes `Status`, a non-JSON body
/// becomes `Decode`.
pub(crate) fn decode_response(url: &Url, resp: RawResponse) -> Result<Fetched, PollError> {
    if !(200..300).contains(&resp.status) {
        return Err(PollError::Status {
            status: resp.status,
            url: url.to_string(),
            body: (!resp.body.is_empty()).then_some(resp.body),
        });
    }

    let variant = variant_header(&resp.headers);
    let payload = serde_json::from_str(&resp.body).map_err(|e| PollError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    Ok(Fetched { payload, variant })
}

fn variant_header(headers: &[(String, String)]) -> Option<String> {
    headers
        .iter()
        .find(|(name, _)| name.to_ascii_lowercase().contains("variant"))
        .map(|(_, value)| value.clone())
}
