use crate::{errors::ImageError, image::Registry};
use parking_lot::Mutex;
use regex::Regex;
use reqwest::{RequestBuilder, Url};
use std::collections::HashMap;

/// Bearer tokens, shared by every clone of a client
#[derive(Default)]
pub struct Auth {
    tokens: Mutex<HashMap<Registry, String>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(alias = "access_token")]
    token: String,
}

impl Auth {
    pub fn new() -> Self {
        Auth::default()
    }

    pub fn include_token(&self, registry: &Registry, req: RequestBuilder) -> RequestBuilder {
        match self.tokens.lock().get(registry) {
            Some(token) => {
                log::debug!("using token for {}", registry);
                req.bearer_auth(token)
            }
            None => req,
        }
    }

    /// Reference: <https://docs.docker.com/registry/spec/auth/token/>
    pub async fn authenticate_for(
        &self,
        registry: &Registry,
        req: &reqwest::Client,
        auth_header: &str,
    ) -> Result<(), ImageError> {
        let challenge = BearerChallenge::parse(auth_header)?;
        log::debug!("login challenge for {}, {:?}", registry, challenge);
        let req = req
            .get(challenge.realm)
            .query(&[("service", challenge.service), ("scope", challenge.scope)]);
        let response: TokenResponse = req.send().await?.error_for_status()?.json().await?;
        log::debug!("received token for {}", registry);
        self.tokens.lock().insert(registry.clone(), response.token);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BearerChallenge {
    pub realm: Url,
    pub service: String,
    pub scope: String,
}

impl BearerChallenge {
    pub(crate) fn parse(auth_header: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref RE: Regex = Regex::new(concat!(
                "^\\s*",
                "(?i:bearer)",
                "(?:",
                /* */ "\\s*",
                /* */ "(?:",
                /* -- */ "(?:service=\"(?P<service>",
                /* -- -- */ r"[\x20-\x21\x23-\x5B\x5D-\x7E]*", // RFC 6750 quoted-string chars
                /* -- */ ")\")|",
                /* -- */ "(?:scope=\"(?P<scope>",
                /* -- -- */ r"[\x20-\x21\x23-\x5B\x5D-\x7E]*",
                /* -- */ ")\")|",
                /* -- */ "(?:realm=\"(?P<realm>",
                /* -- -- */ "https://", // token servers must use https
                /* -- -- */ "[-_.+a-zA-Z:0-9/]+",
                /* -- */ ")\")",
                /* */ ")",
                /* */ ",?",
                ")*$",
            ))
            .unwrap();
        }
        let parts = RE.captures(auth_header).map(|captures| {
            (
                captures.name("service").map(|m| m.as_str().to_owned()),
                captures.name("scope").map(|m| m.as_str().to_owned()),
                captures.name("realm").map(|m| m.as_str().parse::<Url>()),
            )
        });
        match parts {
            Some((Some(service), Some(scope), Some(Ok(realm)))) => Ok(BearerChallenge {
                realm,
                service,
                scope,
            }),
            _ => Err(ImageError::UnsupportedAuthentication(
                auth_header.to_string(),
            )),
        }
    }
}
