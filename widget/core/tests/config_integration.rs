//! Integration tests for configuration and persistence
//!
//! A TOML file and a locale file drive a mounted widget.

use std::io::Write;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::{NamedTempFile, TempDir};

use widget_core::config::{load_config_with_env, ConfigSource};
use widget_core::{
    BackendError, DialogBackend, FileLocaleStore, LocaleStore, TurnReply, TurnRequest,
    UserAction, Widget,
};

struct SilentBackend;

#[async_trait]
impl DialogBackend for SilentBackend {
    fn name(&self) -> &str {
        "Silent"
    }

    async fn send_turn(&self, _request: TurnRequest) -> Result<TurnReply, BackendError> {
        Ok(TurnReply::default())
    }
}

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_origins_from_file_gate_the_channel() {
    let file = write_config(
        r#"
[channel]
allowed_origins = ["https://www.example.com/"]
"#,
    );
    let config = load_config_with_env(Some(file.path().to_path_buf()), |_| None).unwrap();
    assert_eq!(config.source(), ConfigSource::File);

    let (mut widget, parent, _handle) = Widget::new(&config, SilentBackend);
    let task = tokio::spawn(async move {
        widget.run().await;
    });

    // Trailing slash and case differences are normalized away.
    let rx = parent
        .post_with_port("HTTPS://WWW.EXAMPLE.COM", json!({ "event": "ping" }))
        .await
        .unwrap();
    assert_eq!(tokio_test::assert_ok!(rx.await), json!({ "event": "pong" }));

    let rx = parent
        .post_with_port("https://other.example.com", json!({ "event": "ping" }))
        .await
        .unwrap();
    tokio_test::assert_err!(rx.await);

    drop(parent);
    task.await.unwrap();
}

#[tokio::test]
async fn test_locale_survives_remount() {
    let dir = TempDir::new().unwrap();
    let locale_path = dir.path().join("selected-locale");
    let file = write_config("[ui]\nlocales = \"en_US,fr_FR,de_DE\"\n");
    let config = load_config_with_env(Some(file.path().to_path_buf()), |_| None).unwrap();

    {
        let (widget, _parent, _handle) = Widget::new(&config, SilentBackend);
        let mut widget =
            widget.with_locale_store(Box::new(FileLocaleStore::new(locale_path.clone())));
        assert_eq!(widget.locales().current(), Some("en_US"));
        widget
            .perform(UserAction::SelectLocale("de_DE".to_string()))
            .unwrap();
    }

    assert_eq!(
        FileLocaleStore::new(locale_path.clone()).load().unwrap().as_deref(),
        Some("de_DE")
    );

    let (widget, _parent, _handle) = Widget::new(&config, SilentBackend);
    let widget = widget.with_locale_store(Box::new(FileLocaleStore::new(locale_path)));
    assert_eq!(widget.locales().ids_csv(), "de_DE,en_US,fr_FR");
}
