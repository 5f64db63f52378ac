//! Property topic scheme.
//!
//! Topic structure: `{prefix}/twin/{operation}/?{query}`
//!
//! Matching is literal and case-sensitive. Variable segments are the status
//! path segment and the `$rid` / `$version` query parameters.

use pnp_twin_core::{status, PropertyError, ResponseDescriptor, ResponseKind, Result};
use serde::{Deserialize, Serialize};

/// Default topic prefix.
pub const DEFAULT_PREFIX: &str = "$iothub";

const RID_PARAM: &str = "$rid";
const VERSION_PARAM: &str = "$version";
const DESIRED_PATCH_PATH: &str = "PATCH/properties/desired";

/// Characters that would break the query fragment of a topic.
const RESERVED_ID_CHARS: &[char] = &['&', '/', '#', '+', '?', '='];

/// Outbound request kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    /// Request the full property document
    DocumentGet,
    /// Publish reported properties
    ReportedPatch,
    /// The service's response shape, built for loopback and test harnesses
    Response {
        /// HTTP-like status
        status: u16,
        /// Document version, when the response confirms a reported patch
        version: Option<i64>,
    },
}

/// Topic scheme configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicScheme {
    /// Topic prefix (default: "$iothub")
    pub prefix: String,
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl TopicScheme {
    /// Create a topic scheme with the given prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Build the base topic path.
    fn base(&self) -> String {
        format!("{}/twin", self.prefix)
    }

    /// Subscription filter for GET responses and reported acks.
    #[must_use]
    pub fn response_filter(&self) -> String {
        format!("{}/res/#", self.base())
    }

    /// Subscription filter for desired-property patches.
    #[must_use]
    pub fn desired_patch_filter(&self) -> String {
        format!("{}/{DESIRED_PATCH_PATH}/#", self.base())
    }

    /// Topic for a request of `kind` correlated by `correlation_id`.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::InvalidTopic`] if the correlation id is empty or
    /// contains a character reserved by the topic syntax.
    pub fn topic(&self, kind: RequestKind, correlation_id: &str) -> Result<String> {
        validate_correlation_id(correlation_id)?;

        let topic = match kind {
            RequestKind::DocumentGet => {
                format!("{}/GET/?{RID_PARAM}={correlation_id}", self.base())
            }
            RequestKind::ReportedPatch => format!(
                "{}/PATCH/properties/reported/?{RID_PARAM}={correlation_id}",
                self.base()
            ),
            RequestKind::Response {
                status,
                version: None,
            } => format!("{}/res/{status}/?{RID_PARAM}={correlation_id}", self.base()),
            RequestKind::Response {
                status,
                version: Some(version),
            } => format!(
                "{}/res/{status}/?{RID_PARAM}={correlation_id}&{VERSION_PARAM}={version}",
                self.base()
            ),
        };
        Ok(topic)
    }

    /// Exact length of the topic [`write_topic`](Self::write_topic) would produce.
    ///
    /// # Errors
    ///
    /// Same as [`topic`](Self::topic).
    pub fn required_len(&self, kind: RequestKind, correlation_id: &str) -> Result<usize> {
        self.topic(kind, correlation_id).map(|topic| topic.len())
    }

    /// Write the topic into a caller-owned buffer and return its length.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::InsufficientBuffer`] with the exact required length
    /// if `out` is too small, in which case `out` is left untouched.
    pub fn write_topic(
        &self,
        kind: RequestKind,
        correlation_id: &str,
        out: &mut [u8],
    ) -> Result<usize> {
        let topic = self.topic(kind, correlation_id)?;
        if topic.len() > out.len() {
            return Err(PropertyError::InsufficientBuffer {
                required: topic.len(),
                available: out.len(),
            });
        }
        out[..topic.len()].copy_from_slice(topic.as_bytes());
        Ok(topic.len())
    }

    /// Classify an inbound topic.
    ///
    /// Returns `Ok(None)` when the topic is not a property topic, so the caller
    /// can try other topic families.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::InvalidTopic`] if a property topic carries a
    /// malformed status or version, or a response lacks its `$rid`.
    pub fn classify(&self, topic: &str) -> Result<Option<ResponseDescriptor>> {
        let Some(rest) = topic
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix("/twin/"))
        else {
            return Ok(None);
        };

        if let Some(rest) = rest.strip_prefix("res/") {
            let end = rest.find(['/', '?']).unwrap_or(rest.len());
            let (status_segment, rest) = rest.split_at(end);
            let status: u16 = status_segment
                .parse()
                .map_err(|_| invalid(topic, format!("status `{status_segment}`")))?;

            let query = parse_query(topic, query_part(rest))?;
            let correlation_id = query
                .correlation_id
                .ok_or_else(|| invalid(topic, "missing `$rid`".to_string()))?;

            let kind = if status == status::OK {
                ResponseKind::DocumentGet
            } else {
                ResponseKind::ReportedAck
            };

            tracing::trace!(topic, %kind, status, "Classified property response");
            return Ok(Some(ResponseDescriptor {
                kind,
                correlation_id: Some(correlation_id.to_string()),
                status: Some(status),
                version: query.version,
            }));
        }

        if let Some(rest) = rest.strip_prefix(DESIRED_PATCH_PATH) {
            if !(rest.is_empty() || rest.starts_with(['/', '?'])) {
                return Ok(None);
            }
            let query = parse_query(topic, query_part(rest))?;

            tracing::trace!(topic, version = ?query.version, "Classified desired patch");
            return Ok(Some(ResponseDescriptor {
                kind: ResponseKind::DesiredPatch,
                correlation_id: query.correlation_id.map(str::to_string),
                status: None,
                version: query.version,
            }));
        }

        Ok(None)
    }
}

#[derive(Debug, Default)]
struct Query<'a> {
    correlation_id: Option<&'a str>,
    version: Option<i64>,
}

/// Strip the `/` and `?` separating a path from its query.
fn query_part(rest: &str) -> &str {
    let rest = rest.strip_prefix('/').unwrap_or(rest);
    rest.strip_prefix('?').unwrap_or(rest)
}

fn parse_query<'a>(topic: &str, query: &'a str) -> Result<Query<'a>> {
    let mut parsed = Query::default();
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        match key {
            RID_PARAM => {
                if value.is_empty() {
                    return Err(invalid(topic, "empty `$rid`".to_string()));
                }
                parsed.correlation_id = Some(value);
            }
            VERSION_PARAM => {
                let version = value
                    .parse()
                    .map_err(|_| invalid(topic, format!("version `{value}`")))?;
                parsed.version = Some(version);
            }
            _ => {}
        }
    }
    Ok(parsed)
}

fn validate_correlation_id(correlation_id: &str) -> Result<()> {
    if correlation_id.is_empty() {
        return Err(PropertyError::InvalidTopic(
            "correlation id must not be empty".to_string(),
        ));
    }
    if correlation_id.contains(RESERVED_ID_CHARS) {
        return Err(PropertyError::InvalidTopic(format!(
            "correlation id `{correlation_id}` contains a reserved character"
        )));
    }
    Ok(())
}

fn invalid(topic: &str, detail: String) -> PropertyError {
    PropertyError::InvalidTopic(format!("{topic}: {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_generation() {
        let scheme = TopicScheme::default();

        assert_eq!(
            scheme.topic(RequestKind::DocumentGet, "1").unwrap(),
            "$iothub/twin/GET/?$rid=1"
        );
        assert_eq!(
            scheme.topic(RequestKind::ReportedPatch, "42").unwrap(),
            "$iothub/twin/PATCH/properties/reported/?$rid=42"
        );
        assert_eq!(
            scheme
                .topic(
                    RequestKind::Response {
                        status: 204,
                        version: Some(5)
                    },
                    "42"
                )
                .unwrap(),
            "$iothub/twin/res/204/?$rid=42&$version=5"
        );
    }

    #[test]
    fn subscription_filters() {
        let scheme = TopicScheme::default();

        assert_eq!(scheme.response_filter(), "$iothub/twin/res/#");
        assert_eq!(
            scheme.desired_patch_filter(),
            "$iothub/twin/PATCH/properties/desired/#"
        );
    }

    #[test]
    fn write_topic_reports_required_length() {
        let scheme = TopicScheme::default();
        let required = scheme.required_len(RequestKind::DocumentGet, "7").unwrap();
        assert_eq!(required, "$iothub/twin/GET/?$rid=7".len());

        let mut small = [0u8; 8];
        assert_eq!(
            scheme.write_topic(RequestKind::DocumentGet, "7", &mut small),
            Err(PropertyError::InsufficientBuffer {
                required,
                available: 8,
            })
        );
        assert_eq!(small, [0u8; 8]);

        let mut exact = vec![0u8; required];
        let written = scheme
            .write_topic(RequestKind::DocumentGet, "7", &mut exact)
            .unwrap();
        assert_eq!(&exact[..written], b"$iothub/twin/GET/?$rid=7");
    }

    #[test]
    fn rejects_reserved_correlation_ids() {
        let scheme = TopicScheme::default();
        for id in ["", "a&b", "a/b", "#", "a+b", "a?b"] {
            assert!(matches!(
                scheme.topic(RequestKind::ReportedPatch, id),
                Err(PropertyError::InvalidTopic(_))
            ));
        }
    }

    #[test]
    fn classifies_document_response() {
        let scheme = TopicScheme::default();
        let response = scheme
            .classify("$iothub/twin/res/200/?$rid=abc")
            .unwrap()
            .unwrap();

        assert_eq!(response.kind, ResponseKind::DocumentGet);
        assert_eq!(response.correlation_id.as_deref(), Some("abc"));
        assert_eq!(response.status, Some(200));
        assert_eq!(response.version, None);
    }

    #[test]
    fn classifies_reported_ack() {
        let scheme = TopicScheme::default();
        let response = scheme
            .classify("$iothub/twin/res/204/?$rid=9&$version=12")
            .unwrap()
            .unwrap();

        assert_eq!(response.kind, ResponseKind::ReportedAck);
        assert_eq!(response.correlation_id.as_deref(), Some("9"));
        assert_eq!(response.status, Some(204));
        assert_eq!(response.version, Some(12));
        assert!(response.is_success());

        let throttled = scheme
            .classify("$iothub/twin/res/429/?$rid=10")
            .unwrap()
            .unwrap();
        assert_eq!(throttled.kind, ResponseKind::ReportedAck);
        assert!(!throttled.is_success());
    }

    #[test]
    fn classifies_desired_patch() {
        let scheme = TopicScheme::default();
        let response = scheme
            .classify("$iothub/twin/PATCH/properties/desired/?$version=7")
            .unwrap()
            .unwrap();

        assert_eq!(response.kind, ResponseKind::DesiredPatch);
        assert_eq!(response.version, Some(7));
        assert_eq!(response.correlation_id, None);
        assert_eq!(response.status, None);
    }

    #[test]
    fn desired_patch_without_version_still_matches() {
        let scheme = TopicScheme::default();
        let response = scheme
            .classify("$iothub/twin/PATCH/properties/desired/")
            .unwrap()
            .unwrap();
        assert_eq!(response.kind, ResponseKind::DesiredPatch);
        assert_eq!(response.version, None);
    }

    #[test]
    fn unrelated_topics_are_not_recognized() {
        let scheme = TopicScheme::default();
        for topic in [
            "$iothub/methods/POST/reboot/?$rid=1",
            "$iothub/twin/GET/?$rid=1",
            "$iothub/twin/PATCH/properties/reported/?$rid=1",
            "$iothub/twin/PATCH/properties/desiredX/?$version=1",
            "$IOTHUB/twin/res/200/?$rid=1",
            "devices/d1/messages/devicebound/",
        ] {
            assert_eq!(scheme.classify(topic).unwrap(), None, "{topic}");
        }
    }

    #[test]
    fn malformed_fragments_are_invalid() {
        let scheme = TopicScheme::default();
        for topic in [
            "$iothub/twin/res/abc/?$rid=1",
            "$iothub/twin/res//?$rid=1",
            "$iothub/twin/res/200/?$rid=1&$version=x",
            "$iothub/twin/res/200/",
            "$iothub/twin/res/200/?$rid=",
            "$iothub/twin/PATCH/properties/desired/?$version=seven",
        ] {
            assert!(
                matches!(scheme.classify(topic), Err(PropertyError::InvalidTopic(_))),
                "{topic}"
            );
        }
    }

    #[test]
    fn built_topics_classify_back_to_their_correlation_id() {
        let scheme = TopicScheme::new("$custom");
        for status in [200, 204, 400] {
            let topic = scheme
                .topic(
                    RequestKind::Response {
                        status,
                        version: None,
                    },
                    "req-17",
                )
                .unwrap();
            let response = scheme.classify(&topic).unwrap().unwrap();
            assert_eq!(response.correlation_id.as_deref(), Some("req-17"));
            assert_eq!(response.status, Some(status));
        }
    }
}
