//! Endpoint URL construction.
//!
//! The client talks to two origins: the REST API (history, send, auth) and the
//! live channel. Both are configurable; by default the live origin is derived
//! from the API origin by swapping `http` for `ws` (`https` for `wss`).

use url::Url;

use crate::errors::{ProtocolError, Result};

/// REST and live-channel endpoints of one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    api: Url,
    live: Url,
}

impl Endpoints {
    /// Build endpoints from explicit API and live-channel origins.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidUrl` if either URL cannot carry a path
    pub fn new(api: Url, live: Url) -> Result<Self> {
        for url in [&api, &live] {
            if url.cannot_be_a_base() {
                return Err(ProtocolError::InvalidUrl {
                    url: url.to_string(),
                    reason: "url cannot be a base".to_string(),
                });
            }
        }
        Ok(Self { api, live })
    }

    /// Build endpoints from the API origin, deriving the live origin.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidUrl` if the scheme is not http(s) or ws(s)
    pub fn from_api(api: Url) -> Result<Self> {
        let live = live_origin_for(&api)?;
        Self::new(api, live)
    }

    /// Parse both origins from strings. `live` of `None` derives it.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidUrl` if a URL does not parse or is unusable
    pub fn parse(api: &str, live: Option<&str>) -> Result<Self> {
        let api = parse_url(api)?;
        match live {
            Some(live) => Self::new(api, parse_url(live)?),
            None => Self::from_api(api),
        }
    }

    /// API origin.
    pub fn api(&self) -> &Url {
        &self.api
    }

    /// Live-channel origin.
    pub fn live(&self) -> &Url {
        &self.live
    }

    /// `GET /messages?limit=<N>&before=<cursor>`.
    ///
    /// Absence of `before` requests the newest page.
    pub fn history(&self, limit: u32, before: Option<&str>) -> Url {
        let mut url = with_path(&self.api, &["messages"]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.to_string());
            if let Some(cursor) = before {
                query.append_pair("before", cursor);
            }
        }
        url
    }

    /// `POST /messages`.
    pub fn send(&self) -> Url {
        with_path(&self.api, &["messages"])
    }

    /// `POST /auth/login`.
    pub fn login(&self) -> Url {
        with_path(&self.api, &["auth", "login"])
    }

    /// `POST /auth/register`.
    pub fn register(&self) -> Url {
        with_path(&self.api, &["auth", "register"])
    }

    /// `/ws/messages?deviceId=<id>&token=<token>` on the live origin.
    pub fn live_channel(&self, device_id: &str, token: &str) -> Url {
        let mut url = with_path(&self.live, &["ws", "messages"]);
        url.query_pairs_mut().append_pair("deviceId", device_id).append_pair("token", token);
        url
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw)
        .map_err(|e| ProtocolError::InvalidUrl { url: raw.to_string(), reason: e.to_string() })
}

fn live_origin_for(api: &Url) -> Result<Url> {
    let scheme = match api.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ProtocolError::InvalidUrl {
                url: api.to_string(),
                reason: format!("unsupported scheme {other}"),
            });
        },
    };

    let mut live = api.clone();
    live.set_scheme(scheme).map_err(|()| ProtocolError::InvalidUrl {
        url: api.to_string(),
        reason: format!("cannot switch scheme to {scheme}"),
    })?;
    Ok(live)
}

/// Append path segments to a base URL, keeping any base path prefix.
fn with_path(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    url.set_query(None);
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> Endpoints {
        Endpoints::parse("http://localhost:8000", None).unwrap()
    }

    #[test]
    fn live_origin_derived_from_api() {
        let endpoints = endpoints();
        assert_eq!(endpoints.live().as_str(), "ws://localhost:8000/");

        let secure = Endpoints::parse("https://chat.example.com", None).unwrap();
        assert_eq!(secure.live().scheme(), "wss");
    }

    #[test]
    fn explicit_live_origin_wins() {
        let endpoints =
            Endpoints::parse("http://localhost:8000", Some("ws://realtime:9000")).unwrap();
        assert_eq!(
            endpoints.live_channel("d", "t").as_str(),
            "ws://realtime:9000/ws/messages?deviceId=d&token=t"
        );
    }

    #[test]
    fn history_url_with_and_without_cursor() {
        let endpoints = endpoints();
        assert_eq!(endpoints.history(20, None).as_str(), "http://localhost:8000/messages?limit=20");
        assert_eq!(
            endpoints.history(10, Some("41")).as_str(),
            "http://localhost:8000/messages?limit=10&before=41"
        );
    }

    #[test]
    fn base_path_prefix_is_kept() {
        let endpoints = Endpoints::parse("http://localhost:3000/api/", None).unwrap();
        assert_eq!(endpoints.login().as_str(), "http://localhost:3000/api/auth/login");
        assert_eq!(endpoints.send().as_str(), "http://localhost:3000/api/messages");
    }

    #[test]
    fn device_id_is_query_encoded() {
        let url = endpoints().live_channel("Linux|Chrome|Desktop|s|t", "tok");
        assert_eq!(url.query(), Some("deviceId=Linux%7CChrome%7CDesktop%7Cs%7Ct&token=tok"));
    }

    #[test]
    fn rejects_unusable_urls() {
        assert!(matches!(
            Endpoints::parse("ftp://example.com", None),
            Err(ProtocolError::InvalidUrl { .. })
        ));
        assert!(matches!(Endpoints::parse("not a url", None), Err(ProtocolError::InvalidUrl { .. })));
        assert!(matches!(
            Endpoints::parse("mailto:someone@example.com", Some("ws://x")),
            Err(ProtocolError::InvalidUrl { .. })
        ));
    }
}
