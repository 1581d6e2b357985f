//! 設定ファイルの読み込み

use std::io::ErrorKind;
use std::path::Path;

use super::{
    ConfigError,
    I18nConfig,
};
use crate::fetch::is_remote_url;

/// JSON 設定ファイルから [`I18nConfig`] を読み込む
///
/// ローカルの相対 `assetsUrl` は設定ファイルのディレクトリを基準に解決される。
/// そのため設定ファイルをバンドルと同じ場所に置いたまま、どこからでも起動できる。
/// リモート URL と絶対パスはそのまま。
///
/// # Returns
/// - `Ok(Some(config))`: 読み込みとバリデーションに成功
/// - `Ok(None)`: ファイルが存在しない
/// - `Err(ConfigError::Read | Parse | Invalid)`: 読めない、JSON として不正、または値が不正
pub fn load_from_path(path: &Path) -> Result<Option<I18nConfig>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) if error.kind() == ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No i18n configuration file");
            return Ok(None);
        }
        Err(source) => return Err(ConfigError::Read { path: path.to_path_buf(), source }),
    };

    let mut config: I18nConfig = serde_json::from_str(&content)
        .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
    config.validate().map_err(ConfigError::Invalid)?;

    if let Some(dir) = path.parent() {
        config.assets_url = anchor_assets_url(&config.assets_url, dir);
    }
    tracing::debug!(path = %path.display(), assets_url = %config.assets_url, "Loaded i18n configuration");

    Ok(Some(config))
}

/// 相対ローカルパスを `dir` に連結する（`file://` は外す）
fn anchor_assets_url(assets_url: &str, dir: &Path) -> String {
    if is_remote_url(assets_url) {
        return assets_url.to_string();
    }
    let local = assets_url.strip_prefix("file://").unwrap_or(assets_url);
    if Path::new(local).is_absolute() || dir.as_os_str().is_empty() {
        return local.to_string();
    }
    dir.join(local).display().to_string()
}
