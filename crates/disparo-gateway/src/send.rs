//! Per-recipient message sends, one request builder per payload kind.

use super::{ensure_success, GatewayClient};
use async_trait::async_trait;
use disparo_core::{
    error::DisparoError,
    message::{parse_coordinate, Payload},
    traits::MessageGateway,
};
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use tracing::debug;

/// Request body for one send.
enum SendBody {
    Json(Value),
    Multipart(Form),
}

/// Build the JSON body for every kind except media-by-file.
pub(crate) fn json_body(recipient: &str, payload: &Payload) -> Result<Option<Value>, DisparoError> {
    let body = match payload {
        Payload::Text { text } => json!({ "number": recipient, "text": text }),
        Payload::MediaUrl { media_url, caption } => {
            let mut body = json!({ "number": recipient, "mediaUrl": media_url });
            if let Some(c) = caption.as_deref().filter(|c| !c.is_empty()) {
                body["caption"] = json!(c);
            }
            body
        }
        Payload::Location {
            latitude,
            longitude,
            name,
            address,
        } => {
            let lat = parse_coordinate(latitude, 90.0)
                .ok_or_else(|| DisparoError::invalid("latitude", "not a valid latitude"))?;
            let lon = parse_coordinate(longitude, 180.0)
                .ok_or_else(|| DisparoError::invalid("longitude", "not a valid longitude"))?;
            let mut body = json!({ "number": recipient, "latitude": lat, "longitude": lon });
            if let Some(n) = name.as_deref().filter(|n| !n.is_empty()) {
                body["name"] = json!(n);
            }
            if let Some(a) = address.as_deref().filter(|a| !a.is_empty()) {
                body["address"] = json!(a);
            }
            body
        }
        Payload::List {
            title,
            description,
            button_text,
            footer_text,
            sections,
        } => {
            let mut body = json!({
                "number": recipient,
                "title": title,
                "description": description,
                "buttonText": button_text,
                "sections": sections,
            });
            if let Some(f) = footer_text.as_deref().filter(|f| !f.is_empty()) {
                body["footerText"] = json!(f);
            }
            body
        }
        Payload::MediaFile { .. } => return Ok(None),
    };
    Ok(Some(body))
}

fn build_body(recipient: &str, payload: &Payload) -> Result<SendBody, DisparoError> {
    if let Payload::MediaFile {
        file_name,
        mime_type,
        bytes,
        caption,
    } = payload
    {
        let mut part = Part::bytes(bytes.clone()).file_name(file_name.clone());
        if let Some(mime) = mime_type.as_deref() {
            part = part
                .mime_str(mime)
                .map_err(|e| DisparoError::invalid("file", format!("bad mime type: {e}")))?;
        }
        let mut form = Form::new().text("number", recipient.to_string());
        if let Some(c) = caption.as_deref().filter(|c| !c.is_empty()) {
            form = form.text("caption", c.to_string());
        }
        return Ok(SendBody::Multipart(form.part("file", part)));
    }

    json_body(recipient, payload)?
        .map(SendBody::Json)
        .ok_or_else(|| DisparoError::invalid("payload", "no JSON body for this kind"))
}

impl GatewayClient {
    /// `{backend}/message/send<Kind>/<instance>`.
    pub fn send_url(&self, instance: &str, payload: &Payload) -> String {
        format!(
            "{}/message/{}/{}",
            self.backend_url,
            payload.kind().endpoint(),
            urlencoding::encode(instance.trim())
        )
    }
}

#[async_trait]
impl MessageGateway for GatewayClient {
    async fn send(
        &self,
        instance: &str,
        recipient: &str,
        payload: &Payload,
    ) -> Result<(), DisparoError> {
        let url = self.send_url(instance, payload);
        let request = match build_body(recipient, payload)? {
            SendBody::Json(body) => self.client.post(&url).json(&body),
            SendBody::Multipart(form) => self.client.post(&url).multipart(form),
        };

        let resp = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| DisparoError::Network(format!("send to {recipient} failed: {e}")))?;

        ensure_success(resp, payload.kind().endpoint()).await?;
        debug!("sent {} message to {recipient}", payload.kind().label());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use disparo_core::config::GatewayConfig;
    use disparo_core::message::{ListRow, ListSection};
    use mockito::Matcher;

    fn client_for(server: &mockito::Server, api_key: &str) -> GatewayClient {
        let config = GatewayConfig {
            backend_url: format!("{}/", server.url()),
            api_key: api_key.to_string(),
            ..Default::default()
        };
        GatewayClient::new(&config).unwrap()
    }

    #[test]
    fn test_json_body_location_numbers() {
        let payload = Payload::Location {
            latitude: " -23.5505 ".into(),
            longitude: "-46.6333".into(),
            name: Some("Loja Centro".into()),
            address: None,
        };
        let body = json_body("5511999990000", &payload).unwrap().unwrap();
        assert_eq!(body["number"], "5511999990000");
        assert_eq!(body["latitude"], -23.5505);
        assert_eq!(body["longitude"], -46.6333);
        assert_eq!(body["name"], "Loja Centro");
        assert!(body.get("address").is_none());
    }

    #[test]
    fn test_json_body_list_camel_case() {
        let payload = Payload::List {
            title: "Planos".into(),
            description: "Escolha".into(),
            button_text: "Ver".into(),
            footer_text: None,
            sections: vec![ListSection {
                title: "Mensal".into(),
                rows: vec![ListRow {
                    title: "Basic".into(),
                    description: "R$10".into(),
                    row_id: "basic".into(),
                }],
            }],
        };
        let body = json_body("55", &payload).unwrap().unwrap();
        assert_eq!(body["buttonText"], "Ver");
        assert_eq!(body["sections"][0]["rows"][0]["rowId"], "basic");
        assert!(body.get("footerText").is_none());
    }

    #[test]
    fn test_json_body_media_file_is_multipart() {
        let payload = Payload::MediaFile {
            file_name: "a.png".into(),
            mime_type: None,
            bytes: vec![1, 2, 3],
            caption: None,
        };
        assert!(json_body("55", &payload).unwrap().is_none());
    }

    #[test]
    fn test_send_url_encodes_instance() {
        let config = GatewayConfig {
            backend_url: "https://evo.example.com/".into(),
            ..Default::default()
        };
        let client = GatewayClient::new(&config).unwrap();
        assert_eq!(
            client.send_url("minha loja", &Payload::text("oi")),
            "https://evo.example.com/message/sendText/minha%20loja"
        );
    }

    #[tokio::test]
    async fn test_send_text_with_apikey() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/message/sendText/loja-01")
            .match_header("apikey", "secret")
            .match_body(Matcher::Json(
                json!({"number": "5511999990000", "text": "Promo hoje"}),
            ))
            .with_status(201)
            .create_async()
            .await;

        client_for(&server, "secret")
            .send("loja-01", "5511999990000", &Payload::text("Promo hoje"))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_media_file_multipart() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/message/sendMediaFile/loja-01")
            .match_header(
                "content-type",
                Matcher::Regex("multipart/form-data".to_string()),
            )
            .match_body(Matcher::Regex("promo.png".to_string()))
            .with_status(200)
            .create_async()
            .await;

        let payload = Payload::MediaFile {
            file_name: "promo.png".into(),
            mime_type: Some("image/png".into()),
            bytes: b"fake-png-bytes".to_vec(),
            caption: Some("Confira".into()),
        };
        client_for(&server, "")
            .send("loja-01", "5511999990000", &payload)
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_server_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/message/sendMediaUrl/loja-01")
            .with_status(500)
            .with_body("Internal Server Error")
            .create_async()
            .await;

        let err = client_for(&server, "")
            .send(
                "loja-01",
                "5511999990000",
                &Payload::media_url("https://cdn.example.com/a.jpg"),
            )
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, DisparoError::Network(_)));
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("sendMediaUrl"));
    }
}
