//! Backend REST client.
//!
//! Every call opens a fresh TLS connection with its own timeout; the
//! radio is usually only up for one burst of calls per wake, so there
//! is nothing to pool.

use std::collections::BTreeMap;

use core::time::Duration;

use embedded_svc::http::{Headers, Method, Status};
use embedded_svc::io::{Read as _, Write as _};
use esp_idf_svc::http::client::{Configuration as HttpConfiguration, EspHttpConnection};
use esp_idf_svc::sys;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use inkframe_core::config::{ACK_TIMEOUT, MANIFEST_TIMEOUT, SIGNED_URLS_TIMEOUT, VERSION_TIMEOUT};
use inkframe_core::sync::{
    ApiError, ImageDownload, ManifestItem, RemoteApi, SlideshowManifest, VersionInfo,
};

use crate::config::API_BASE_URL;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionResponse {
    #[serde(default)]
    slideshow_version: u32,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestResponse {
    #[serde(default)]
    slideshow_version: u32,
    #[serde(default)]
    image_ids: Vec<String>,
    #[serde(default)]
    image_hashes: Vec<String>,
}

pub struct HttpApi {
    device_id: String,
}

impl HttpApi {
    pub fn new(device_id: String) -> Self {
        Self { device_id }
    }

    fn connection(&self, timeout: Duration) -> Result<EspHttpConnection, ApiError> {
        let conf = HttpConfiguration {
            timeout: Some(timeout),
            crt_bundle_attach: Some(sys::esp_crt_bundle_attach),
            ..Default::default()
        };
        EspHttpConnection::new(&conf).map_err(transport)
    }

    fn get_json<T: DeserializeOwned>(
        &mut self,
        url: &str,
        timeout: Duration,
    ) -> Result<T, ApiError> {
        let mut conn = self.connection(timeout)?;
        conn.initiate_request(Method::Get, url, &[])
            .map_err(transport)?;
        conn.initiate_response().map_err(transport)?;
        let status = conn.status();
        if status != 200 {
            return Err(ApiError::Status(status));
        }
        let body = read_body(&mut conn)?;
        serde_json::from_slice(&body).map_err(|err| ApiError::Malformed(err.to_string()))
    }

    fn post_json(
        &mut self,
        url: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<Vec<u8>, ApiError> {
        let payload = body.to_string();
        let mut conn = self.connection(timeout)?;
        conn.initiate_request(Method::Post, url, &[("Content-Type", "application/json")])
            .map_err(transport)?;
        conn.write_all(payload.as_bytes())
            .map_err(|err| ApiError::Transport(err.to_string()))?;
        conn.initiate_response().map_err(transport)?;
        let status = conn.status();
        if status != 200 {
            return Err(ApiError::Status(status));
        }
        read_body(&mut conn)
    }
}

impl RemoteApi for HttpApi {
    fn get_version(&mut self, device_key: &str) -> Result<VersionInfo, ApiError> {
        let url = format!(
            "{}/get-slideshow-version?device_id={}&device_key={}",
            API_BASE_URL, self.device_id, device_key
        );
        let response: VersionResponse = self.get_json(&url, VERSION_TIMEOUT)?;
        Ok(VersionInfo {
            version: response.slideshow_version,
            is_new: response.status == "NEW",
        })
    }

    fn get_manifest(&mut self, device_key: &str) -> Result<SlideshowManifest, ApiError> {
        let url = format!(
            "{}/get-slideshow-manifest?device_id={}&device_key={}",
            API_BASE_URL, self.device_id, device_key
        );
        let response: ManifestResponse = self.get_json(&url, MANIFEST_TIMEOUT)?;
        let items = response
            .image_ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| ManifestItem {
                id,
                hash: response.image_hashes.get(i).cloned().unwrap_or_default(),
            })
            .collect();
        Ok(SlideshowManifest {
            version: response.slideshow_version,
            items,
        })
    }

    fn get_signed_urls(
        &mut self,
        device_key: &str,
        ids: &[String],
    ) -> Result<Vec<Option<String>>, ApiError> {
        let url = format!("{}/get-signed-urls", API_BASE_URL);
        let body = serde_json::json!({
            "device_id": self.device_id,
            "device_key": device_key,
            "imageIds": ids,
        });
        let raw = self.post_json(&url, &body, SIGNED_URLS_TIMEOUT)?;
        // The response maps imageId to signedUrl; realign it with the
        // request order.
        let map: BTreeMap<String, String> =
            serde_json::from_slice(&raw).map_err(|err| ApiError::Malformed(err.to_string()))?;
        Ok(ids.iter().map(|id| map.get(id).cloned()).collect())
    }

    fn ack_displayed(&mut self, device_key: &str, version: u32) -> Result<(), ApiError> {
        let url = format!("{}/ack-displayed", API_BASE_URL);
        let body = serde_json::json!({
            "device_id": self.device_id,
            "device_key": device_key,
            "slideshow_version": version,
        });
        self.post_json(&url, &body, ACK_TIMEOUT)?;
        Ok(())
    }

    fn open_download<'a>(
        &'a mut self,
        url: &str,
    ) -> Result<Box<dyn ImageDownload + 'a>, ApiError> {
        // The per-request timeout here is the socket timeout; the
        // overall download budget is enforced by the caller.
        let mut conn = self.connection(VERSION_TIMEOUT)?;
        conn.initiate_request(Method::Get, url, &[])
            .map_err(transport)?;
        conn.initiate_response().map_err(transport)?;
        let status = conn.status();
        if status != 200 {
            return Err(ApiError::Status(status));
        }
        let len = conn
            .header("Content-Length")
            .and_then(|value| value.parse::<u64>().ok());
        Ok(Box::new(EspDownload { conn, len }))
    }
}

struct EspDownload {
    conn: EspHttpConnection,
    len: Option<u64>,
}

impl std::io::Read for EspDownload {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.conn
            .read(buf)
            .map_err(|err| std::io::Error::other(err.to_string()))
    }
}

impl ImageDownload for EspDownload {
    fn content_len(&self) -> Option<u64> {
        self.len
    }
}

fn read_body(conn: &mut EspHttpConnection) -> Result<Vec<u8>, ApiError> {
    let mut body = Vec::new();
    let mut chunk = [0u8; 512];
    loop {
        let n = conn
            .read(&mut chunk)
            .map_err(|err| ApiError::Transport(err.to_string()))?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    Ok(body)
}

fn transport(err: esp_idf_svc::sys::EspError) -> ApiError {
    ApiError::Transport(err.to_string())
}
