use app_state::ObjectStoreSettings;
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{
    PayloadChecksumKind, SignableBody, SignableRequest, SigningParams, SigningSettings,
    UriPathNormalizationMode, sign,
};
use aws_sigv4::sign::v4;
use color_eyre::eyre::{Result, WrapErr, eyre};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::Client;
use std::time::SystemTime;
use url::Url;

/// Client for the MinIO bucket notification extension of the S3 API.
#[derive(Clone)]
pub struct NotificationClient {
    http_client: Client,
    settings: ObjectStoreSettings,
}

impl NotificationClient {
    pub fn new(http_client: Client, settings: &ObjectStoreSettings) -> Self {
        Self {
            http_client,
            settings: settings.clone(),
        }
    }

    /// The `ListenBucketNotification` URL for `bucket`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured endpoint is not a valid URL.
    pub fn listen_url(&self, bucket: &str, events: &[String]) -> Result<Url> {
        let mut url: Url = self
            .settings
            .endpoint
            .parse()
            .wrap_err_with(|| format!("Invalid object store endpoint {}", self.settings.endpoint))?;
        url.path_segments_mut()
            .map_err(|()| eyre!("Object store endpoint cannot be a base URL"))?
            .pop_if_empty()
            .push(bucket);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("prefix", "").append_pair("suffix", "");
            for event in events {
                query.append_pair("events", event);
            }
        }
        Ok(url)
    }

    /// Opens the notification stream for `bucket`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be signed or sent, or the server
    /// rejects it.
    pub async fn listen(&self, bucket: &str, events: &[String]) -> Result<NotificationStream> {
        let url = self.listen_url(bucket, events)?;
        let mut request = self.http_client.get(url.clone());
        for (name, value) in self.sign_get(&url)? {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(eyre!(
                "Object store returned {status} for notification request: {error_text}"
            ));
        }

        Ok(NotificationStream {
            bytes: response.bytes_stream().boxed(),
            lines: LineBuffer::default(),
        })
    }

    /// SigV4 headers for an empty-bodied GET of `url`.
    fn sign_get(&self, url: &Url) -> Result<Vec<(String, String)>> {
        let identity = Credentials::new(
            &self.settings.access_key,
            &self.settings.secret_key,
            None,
            None,
            "settings",
        )
        .into();

        let mut signing_settings = SigningSettings::default();
        signing_settings.payload_checksum_kind = PayloadChecksumKind::XAmzSha256;
        signing_settings.uri_path_normalization_mode = UriPathNormalizationMode::Disabled;

        let params: SigningParams<'_> = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.settings.region)
            .name("s3")
            .time(SystemTime::now())
            .settings(signing_settings)
            .build()?
            .into();

        let signable = SignableRequest::new(
            "GET",
            url.as_str(),
            std::iter::empty(),
            SignableBody::Bytes(&[]),
        )?;
        let (instructions, _signature) = sign(signable, &params)?.into_parts();

        Ok(instructions
            .headers()
            .map(|(name, value)| (name.to_owned(), value.to_owned()))
            .collect())
    }
}

/// Newline-delimited notification lines from an open subscription.
pub struct NotificationStream {
    bytes: BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    lines: LineBuffer,
}

impl NotificationStream {
    /// The next complete line, or `None` once the server closes the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection breaks.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(line) = self.lines.next_line() {
                return Ok(Some(line));
            }
            match self.bytes.next().await {
                Some(chunk) => self.lines.push(&chunk.wrap_err("Notification stream broke")?),
                None => return Ok(self.lines.take_rest()),
            }
        }
    }
}

/// Splits a byte stream into lines across chunk boundaries.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    pub fn next_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line[..end]).into_owned())
    }

    /// Whatever is left after the final newline.
    pub fn take_rest(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}
