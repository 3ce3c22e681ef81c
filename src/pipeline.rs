//! Per-message orchestration: filter, extract, validate, look up,
//! persist, dispatch. Failures are isolated per link; nothing below a
//! configuration error stops the run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::models::{
    AccountDetail, AccountInfo, ChannelRef, Credentials, IncomingMessage, MessageRef,
    RawContentPayload, Record, ValidatedEntryPayload, ValidationResult,
};
use crate::services::extractor;
use crate::services::filter::MessageFilter;
use crate::services::store::RecordStore;
use crate::services::validator::PlaylistValidator;
use crate::services::webhook::WebhookDispatcher;
use crate::services::xtream::{self, AccountStatusClient};
use crate::transport::Transport;

/// Everything one pipeline run needs, constructed once from config and
/// passed explicitly instead of living in globals.
pub struct Pipeline {
    filter: MessageFilter,
    validator: PlaylistValidator,
    account: AccountStatusClient,
    store: RecordStore,
    webhook: WebhookDispatcher,
    lists_dir: PathBuf,
    auto_test: bool,
    record_duplicates: bool,
    /// Links already persisted in this run; consulted only when
    /// duplicate recording is disabled.
    seen_links: HashSet<String>,
}

impl Pipeline {
    pub fn new(config: &Config) -> Self {
        let iptv_timeout = Duration::from_secs(config.iptv_timeout_secs);
        Self {
            filter: MessageFilter::new(
                config.keywords.clone(),
                config.blocked_words.clone(),
                config.substitutions.clone(),
            ),
            validator: PlaylistValidator::new(iptv_timeout),
            account: AccountStatusClient::new(iptv_timeout),
            store: RecordStore::new(config.store_path()),
            webhook: WebhookDispatcher::new(
                &config.webhook_url,
                Duration::from_secs(config.webhook_timeout_secs),
            ),
            lists_dir: config.lists_dir(),
            auto_test: config.auto_test,
            record_duplicates: config.record_duplicates,
            seen_links: HashSet::new(),
        }
    }

    /// Consume the transport feed until it is exhausted, one message
    /// at a time.
    pub async fn run<T: Transport>(&mut self, transport: &mut T) -> Result<()> {
        self.store.ensure_initialized().await?;
        while let Some(message) = transport.next_message().await {
            self.handle_message(&*transport, &message).await;
        }
        info!("transport feed ended");
        Ok(())
    }

    /// Process one message end to end. Never returns an error: every
    /// failure inside is logged and contained.
    pub async fn handle_message<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        message: &IncomingMessage,
    ) {
        info!(
            channel = %message.channel_title,
            message_id = message.message_id,
            "processing message"
        );

        if let Some(text) = message.text.clone() {
            self.handle_content(&text, None, message).await;
        }

        if let Some(attachment_ref) = &message.attachment_ref {
            match transport.download_attachment(attachment_ref).await {
                Ok(bytes) => {
                    let content = String::from_utf8_lossy(&bytes).into_owned();
                    let name = Path::new(attachment_ref)
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned());
                    self.handle_content(&content, name, message).await;
                }
                Err(e) => {
                    error!(error = %e, "failed to download attachment");
                }
            }
        }
    }

    /// Shared path for message text and decoded attachment bodies.
    async fn handle_content(
        &mut self,
        raw: &str,
        file_name: Option<String>,
        message: &IncomingMessage,
    ) {
        if !self.filter.should_process(raw) {
            debug!(message_id = message.message_id, "message filtered out");
            return;
        }
        let content = self.filter.apply_substitutions(raw);

        let links = if self.auto_test {
            extractor::extract(&content)
        } else {
            // Plain forwarder mode: no testing, everything goes the
            // literal-body route.
            Vec::new()
        };

        if links.is_empty() {
            self.handle_literal_body(&content, file_name, message).await;
            return;
        }

        info!(count = links.len(), "playlist links found");
        for link in links {
            if let Err(e) = self.process_link(&link, message).await {
                warn!(link = %link, error = %e, "link skipped");
            }
        }
    }

    /// One link through credentials, validation, account lookup,
    /// persistence and dispatch. An error aborts this link only.
    async fn process_link(&mut self, link: &str, message: &IncomingMessage) -> Result<()> {
        if !self.record_duplicates && self.seen_links.contains(link) {
            debug!(link, "duplicate link skipped this run");
            return Ok(());
        }

        let creds =
            xtream::extract_credentials(link).context("no parseable credentials in link")?;

        let validation = self.validator.test_playlist(link).await;
        if !validation.accessible {
            anyhow::bail!("playlist not accessible: {}", validation.errors.join("; "));
        }
        if !validation.valid_format {
            anyhow::bail!("invalid playlist format: {}", validation.errors.join("; "));
        }
        info!(
            link,
            channels = validation.channel_count,
            "playlist validated"
        );

        let account = self
            .account
            .get_account_info(&creds)
            .await
            .context("account lookup failed")?;

        let record = build_record(link, &creds, &validation, &account, message);
        self.store
            .append(&record)
            .await
            .context("record append failed, row lost for this run")?;
        self.seen_links.insert(link.to_string());

        let payload = ValidatedEntryPayload {
            tipo: "lista_validada",
            timestamp: Utc::now(),
            registro: record,
            conta: AccountDetail {
                is_trial: account.is_trial.clone(),
                active_cons: account.active_connections.clone(),
                max_connections: account.max_connections.clone(),
            },
            canal: channel_ref(message),
            mensagem: message_ref(message),
        };
        if !self.webhook.send(&payload).await && self.webhook.is_configured() {
            warn!(link, "webhook delivery failed; record remains in the store");
        }

        Ok(())
    }

    /// Raw playlist bodies (or URLs the extractor does not recognize)
    /// are saved verbatim and forwarded directly, bypassing validation
    /// and the record store.
    async fn handle_literal_body(
        &self,
        content: &str,
        file_name: Option<String>,
        message: &IncomingMessage,
    ) {
        let trimmed = content.trim_start();
        if !trimmed.starts_with("#EXTM3U") && !content.contains("http") {
            debug!(message_id = message.message_id, "no playlist content, dropping");
            return;
        }

        let file_name = file_name.unwrap_or_else(|| {
            format!(
                "lista_{}_{}.m3u",
                Local::now().format("%Y%m%d_%H%M%S"),
                message.message_id
            )
        });

        if let Err(e) = self.save_list(&file_name, content).await {
            error!(error = %e, "failed to save raw playlist");
            return;
        }
        info!(file = %file_name, "raw playlist saved");

        let payload = RawContentPayload {
            tipo: "conteudo_bruto",
            timestamp: Utc::now(),
            arquivo: file_name,
            conteudo: content.to_string(),
            canal: channel_ref(message),
            mensagem: message_ref(message),
        };
        self.webhook.send(&payload).await;
    }

    async fn save_list(&self, file_name: &str, content: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.lists_dir)
            .await
            .with_context(|| format!("creating {}", self.lists_dir.display()))?;
        let path = self.lists_dir.join(file_name);
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

fn build_record(
    link: &str,
    creds: &Credentials,
    validation: &ValidationResult,
    account: &AccountInfo,
    message: &IncomingMessage,
) -> Record {
    let mut notes = Vec::new();
    if account.is_trial == "1" {
        notes.push("conta trial".to_string());
    }
    if !account.active_connections.is_empty() || !account.max_connections.is_empty() {
        notes.push(format!(
            "conexoes {}/{}",
            account.active_connections, account.max_connections
        ));
    }

    Record {
        link_m3u: link.to_string(),
        servidor: creds.server.clone(),
        porta: creds.port,
        username: creds.username.clone(),
        password: creds.password.clone(),
        data_criacao: account.created_at.clone(),
        data_vencimento: account.expires_at.clone(),
        total_canais: validation.channel_count,
        status: account.status.clone(),
        data_teste: Local::now().format("%d/%m/%Y %H:%M").to_string(),
        observacoes: notes.join(" | "),
        canal_origem: message.channel_title.clone(),
        mensagem_id: message.message_id,
    }
}

fn channel_ref(message: &IncomingMessage) -> ChannelRef {
    ChannelRef {
        titulo: message.channel_title.clone(),
        id: message.channel_id.clone(),
    }
}

fn message_ref(message: &IncomingMessage) -> MessageRef {
    MessageRef {
        id: message.message_id,
        data: message.timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn next_message(&mut self) -> Option<IncomingMessage> {
            None
        }

        async fn download_attachment(&self, _attachment_ref: &str) -> Result<Vec<u8>> {
            anyhow::bail!("no attachments in this test")
        }
    }

    /// Serves fixed bytes for any attachment reference.
    struct AttachmentTransport(Vec<u8>);

    #[async_trait]
    impl Transport for AttachmentTransport {
        async fn next_message(&mut self) -> Option<IncomingMessage> {
            None
        }

        async fn download_attachment(&self, _attachment_ref: &str) -> Result<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    fn test_config(data_dir: &Path, webhook_url: &str) -> Config {
        Config {
            api_id: 1,
            api_hash: "hash".into(),
            source_channels: vec!["canal".into()],
            webhook_url: webhook_url.into(),
            webhook_timeout_secs: 5,
            iptv_timeout_secs: 5,
            auto_test: true,
            keywords: vec![],
            blocked_words: vec![],
            substitutions: vec![],
            record_duplicates: true,
            data_dir: data_dir.to_path_buf(),
        }
    }

    fn message_with_text(text: &str) -> IncomingMessage {
        IncomingMessage {
            channel_title: "Canal Teste".into(),
            channel_id: "-100999".into(),
            message_id: 7,
            text: Some(text.into()),
            attachment_ref: None,
            timestamp: Utc::now(),
        }
    }

    /// Mount playlist + account-status endpoints on one mock server.
    async fn mount_iptv_server(server: &MockServer, extinf_lines: usize) {
        let mut body = String::from("#EXTM3U\n");
        for i in 0..extinf_lines {
            body.push_str(&format!("#EXTINF:-1,Canal {i}\nhttp://s/{i}\n"));
        }
        Mock::given(method("GET"))
            .and(path("/get.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/player_api.php"))
            .and(query_param("username", "u1"))
            .and(query_param("password", "p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "user_info": {
                    "status": "Active",
                    "is_trial": "0",
                    "active_cons": "1",
                    "max_connections": "2",
                    "created_at": "1600000000",
                    "exp_date": "1893456000"
                }
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn end_to_end_validated_link_produces_one_record_and_one_delivery() {
        let iptv = MockServer::start().await;
        mount_iptv_server(&iptv, 2).await;

        let webhook = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&webhook)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), &webhook.uri());
        let mut pipeline = Pipeline::new(&config);

        let link = format!("{}/get.php?username=u1&password=p1&type=m3u", iptv.uri());
        let message = message_with_text(&format!("lista nova: {link}"));
        pipeline.handle_message(&NullTransport, &message).await;

        let contents = std::fs::read_to_string(config.store_path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2, "header plus exactly one record");
        let row = lines[1];
        assert!(row.starts_with(&link));
        assert!(row.contains(",2,Active,"), "row: {row}");
        assert!(row.contains("Canal Teste"));
    }

    #[tokio::test]
    async fn failed_link_is_isolated_from_siblings() {
        let iptv = MockServer::start().await;
        mount_iptv_server(&iptv, 1).await;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), "");
        let mut pipeline = Pipeline::new(&config);

        // First link dead, second link healthy.
        let good = format!("{}/get.php?username=u1&password=p1&type=m3u", iptv.uri());
        let text = format!(
            "http://127.0.0.1:9/get.php?username=x&password=y&type=m3u e {good}"
        );
        pipeline
            .handle_message(&NullTransport, &message_with_text(&text))
            .await;

        let contents = std::fs::read_to_string(config.store_path()).unwrap();
        assert_eq!(contents.lines().count(), 2, "only the healthy link persisted");
        assert!(contents.contains(&good));
    }

    #[tokio::test]
    async fn invalid_format_produces_no_record() {
        let iptv = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/get.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&iptv)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), "");
        let mut pipeline = Pipeline::new(&config);

        let link = format!("{}/get.php?username=u1&password=p1&type=m3u", iptv.uri());
        pipeline
            .handle_message(&NullTransport, &message_with_text(&link))
            .await;

        // Store file exists only if something was appended.
        assert!(!config.store_path().exists());
    }

    #[tokio::test]
    async fn literal_body_is_saved_and_forwarded_raw() {
        let webhook = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&webhook)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), &webhook.uri());
        let mut pipeline = Pipeline::new(&config);

        let body = "#EXTM3U\n#EXTINF:-1,Canal A\nrtp://239.0.0.1:1234\n";
        pipeline
            .handle_message(&NullTransport, &message_with_text(body))
            .await;

        let mut saved = std::fs::read_dir(config.lists_dir()).unwrap();
        let entry = saved.next().expect("one saved list").unwrap();
        assert!(entry.file_name().to_string_lossy().ends_with(".m3u"));
        assert_eq!(std::fs::read_to_string(entry.path()).unwrap(), body);
        assert!(!config.store_path().exists(), "literal body bypasses the store");
    }

    fn message_with_attachment(attachment_ref: &str) -> IncomingMessage {
        IncomingMessage {
            channel_title: "Canal Teste".into(),
            channel_id: "-100999".into(),
            message_id: 9,
            text: None,
            attachment_ref: Some(attachment_ref.into()),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn attachment_without_links_is_saved_under_its_own_name() {
        let webhook = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&webhook)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), &webhook.uri());
        let mut pipeline = Pipeline::new(&config);

        let body = "#EXTM3U\n#EXTINF:-1,Canal A\nrtp://239.0.0.1:1234\n";
        let transport = AttachmentTransport(body.as_bytes().to_vec());
        pipeline
            .handle_message(&transport, &message_with_attachment("/tmp/in/canais.m3u"))
            .await;

        let saved = config.lists_dir().join("canais.m3u");
        assert_eq!(std::fs::read_to_string(saved).unwrap(), body);
        assert!(!config.store_path().exists(), "raw attachment bypasses the store");
    }

    #[tokio::test]
    async fn attachment_with_link_goes_through_the_full_pipeline() {
        let iptv = MockServer::start().await;
        mount_iptv_server(&iptv, 1).await;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), "");
        let mut pipeline = Pipeline::new(&config);

        let link = format!("{}/get.php?username=u1&password=p1&type=m3u", iptv.uri());
        let transport = AttachmentTransport(format!("lista em anexo: {link}\n").into_bytes());
        pipeline
            .handle_message(&transport, &message_with_attachment("/tmp/in/links.txt"))
            .await;

        let contents = std::fs::read_to_string(config.store_path()).unwrap();
        assert_eq!(contents.lines().count(), 2, "header plus one validated record");
        assert!(contents.contains(&link));
    }

    #[tokio::test]
    async fn blocked_attachment_content_is_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path(), "");
        config.blocked_words = vec!["spam".into()];
        let mut pipeline = Pipeline::new(&config);

        let transport = AttachmentTransport(b"#EXTM3U\nspam entry\n".to_vec());
        pipeline
            .handle_message(&transport, &message_with_attachment("/tmp/in/spam.m3u"))
            .await;

        assert!(!config.lists_dir().exists());
        assert!(!config.store_path().exists());
    }

    #[tokio::test]
    async fn auto_test_disabled_forwards_without_validation() {
        let webhook = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&webhook)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path(), &webhook.uri());
        config.auto_test = false;
        let mut pipeline = Pipeline::new(&config);

        // A link that would normally enter the testing pipeline.
        let text = "http://srv.example/get.php?username=a&password=b&type=m3u";
        pipeline
            .handle_message(&NullTransport, &message_with_text(text))
            .await;

        assert!(!config.store_path().exists());
        assert_eq!(std::fs::read_dir(config.lists_dir()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn duplicate_policy_skips_repeated_links_when_disabled() {
        let iptv = MockServer::start().await;
        mount_iptv_server(&iptv, 1).await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path(), "");
        config.record_duplicates = false;
        let mut pipeline = Pipeline::new(&config);

        let link = format!("{}/get.php?username=u1&password=p1&type=m3u", iptv.uri());
        pipeline
            .handle_message(&NullTransport, &message_with_text(&link))
            .await;
        pipeline
            .handle_message(&NullTransport, &message_with_text(&link))
            .await;

        let contents = std::fs::read_to_string(config.store_path()).unwrap();
        assert_eq!(contents.lines().count(), 2, "second append skipped");
    }

    #[tokio::test]
    async fn filtered_message_produces_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path(), "");
        config.blocked_words = vec!["spam".into()];
        let mut pipeline = Pipeline::new(&config);

        pipeline
            .handle_message(
                &NullTransport,
                &message_with_text("spam http://x.example/lista.m3u"),
            )
            .await;

        assert!(!config.store_path().exists());
        assert!(!config.lists_dir().exists());
    }
}
