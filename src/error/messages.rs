//! Localized message templates.
//!
//! Templates are looked up by `(Language, MessageKey)` and rendered with
//! `{placeholder}` substitution. Placeholders with no matching parameter are
//! kept verbatim.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Languages a message can be rendered in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ja,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ja => "ja",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en" => Ok(Self::En),
            "ja" => Ok(Self::Ja),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

/// Identifier of a localizable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKey {
    CommandTimeout,
    CompileTimeout,
    ProcessTimeout,
    CommandDirUnavailable,
    DataDirUnavailable,
    InvalidParameters,
    MissingParameter,
    InvalidVector,
    UnknownCommandType,
    ToolNotFound,
    MethodNotFound,
    CommandRejected,
    CommandFailed,
    CommandNotFound,
    PermissionDenied,
    ProcessFailed,
    ProcessNotFound,
    DataNotAvailable,
    CompilationFailed,
    ConfigMissing,
    ConfigInvalid,
    Internal,
    Cancelled,
}

/// Template for `key` in `lang`.
pub fn template(lang: Language, key: MessageKey) -> &'static str {
    use MessageKey::*;

    match (lang, key) {
        (Language::En, CommandTimeout) => {
            "Unity did not complete {commandType} ({commandId}) within {timeoutMs}ms. Check that \
             the Unity Editor is running and the MCP package is installed"
        }
        (Language::Ja, CommandTimeout) => {
            "Unityが{timeoutMs}ms以内に{commandType} ({commandId}) \
             を完了しませんでした。Unityエディタが起動しMCPパッケージが導入されているか確認してください"
        }

        (Language::En, CompileTimeout) => "Compilation did not finish within {timeoutMs}ms",
        (Language::Ja, CompileTimeout) => "コンパイルが{timeoutMs}ms以内に完了しませんでした",

        (Language::En, ProcessTimeout) => {
            "Command exceeded the {timeoutMs}ms execution limit: {command}"
        }
        (Language::Ja, ProcessTimeout) => "コマンドが実行制限時間{timeoutMs}msを超えました: {command}",

        (Language::En, CommandDirUnavailable) => "Cannot access command directory {path}: {reason}",
        (Language::Ja, CommandDirUnavailable) => "コマンドディレクトリ{path}にアクセスできません: {reason}",

        (Language::En, DataDirUnavailable) => "Cannot watch data directory {path}: {reason}",
        (Language::Ja, DataDirUnavailable) => "データディレクトリ{path}を監視できません: {reason}",

        (Language::En, InvalidParameters) => "Invalid parameters: {reason}",
        (Language::Ja, InvalidParameters) => "パラメータが不正です: {reason}",

        (Language::En, MissingParameter) => "Missing required parameter '{parameter}'",
        (Language::Ja, MissingParameter) => "必須パラメータ'{parameter}'がありません",

        (Language::En, InvalidVector) => "Parameter '{parameter}' is invalid: {reason}",
        (Language::Ja, InvalidVector) => "パラメータ'{parameter}'が不正です: {reason}",

        (Language::En, UnknownCommandType) => "Unknown command type '{commandType}'",
        (Language::Ja, UnknownCommandType) => "不明なコマンドタイプ'{commandType}'です",

        (Language::En, ToolNotFound) => "Unknown tool: {tool}",
        (Language::Ja, ToolNotFound) => "不明なツールです: {tool}",

        (Language::En, MethodNotFound) => "Method not found: {method}",
        (Language::Ja, MethodNotFound) => "メソッドが見つかりません: {method}",

        (Language::En, CommandRejected) => "Command rejected: {reason}",
        (Language::Ja, CommandRejected) => "コマンドが拒否されました: {reason}",

        (Language::En, CommandFailed) => "Unity failed to execute {commandType}: {error}",
        (Language::Ja, CommandFailed) => "Unityで{commandType}の実行に失敗しました: {error}",

        (Language::En, CommandNotFound) => "Command record {commandId} was not found",
        (Language::Ja, CommandNotFound) => "コマンドレコード{commandId}が見つかりません",

        (Language::En, PermissionDenied) => "Permission denied accessing {path}",
        (Language::Ja, PermissionDenied) => "{path}へのアクセスが拒否されました",

        (Language::En, ProcessFailed) => "Process failed: {reason}",
        (Language::Ja, ProcessFailed) => "プロセスが失敗しました: {reason}",

        (Language::En, ProcessNotFound) => "Executable '{program}' was not found",
        (Language::Ja, ProcessNotFound) => "実行ファイル'{program}'が見つかりません",

        (Language::En, DataNotAvailable) => {
            "Unity data '{key}' is not available. Make sure the Unity Editor is running and \
             exporting to {path}"
        }
        (Language::Ja, DataNotAvailable) => {
            "Unityデータ'{key}'が利用できません。Unityエディタが起動し{path}へ出力しているか確認してください"
        }

        (Language::En, CompilationFailed) => "Compilation failed with {errorCount} error(s)",
        (Language::Ja, CompilationFailed) => "コンパイルが{errorCount}件のエラーで失敗しました",

        (Language::En, ConfigMissing) => "Configuration file not found: {path}",
        (Language::Ja, ConfigMissing) => "設定ファイルが見つかりません: {path}",

        (Language::En, ConfigInvalid) => "Invalid configuration: {reason}",
        (Language::Ja, ConfigInvalid) => "設定が不正です: {reason}",

        (Language::En, Internal) => "Internal error: {reason}",
        (Language::Ja, Internal) => "内部エラー: {reason}",

        (Language::En, Cancelled) => {
            "Operation '{operation}' was cancelled because the server is shutting down"
        }
        (Language::Ja, Cancelled) => "サーバー終了のため操作'{operation}'はキャンセルされました",
    }
}

/// Replace `{name}` placeholders with values from `params`.
pub fn substitute(template: &str, params: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match params.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

/// Render `key` in `lang` with `params`.
pub fn render(lang: Language, key: MessageKey, params: &BTreeMap<String, String>) -> String {
    substitute(template(lang, key), params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_known_placeholders() {
        let out = substitute("{a} and {b}", &params(&[("a", "1"), ("b", "2")]));
        assert_eq!(out, "1 and 2");
    }

    #[test]
    fn unknown_placeholders_stay_verbatim() {
        let out = substitute("hello {name}, {missing}", &params(&[("name", "cube")]));
        assert_eq!(out, "hello cube, {missing}");
    }

    #[test]
    fn unterminated_brace_is_kept() {
        let out = substitute("value {oops", &params(&[("oops", "x")]));
        assert_eq!(out, "value {oops");
    }

    #[test]
    fn same_key_renders_per_language() {
        let p = params(&[("tool", "unity_fly")]);
        assert_eq!(render(Language::En, MessageKey::ToolNotFound, &p), "Unknown tool: unity_fly");
        assert_eq!(render(Language::Ja, MessageKey::ToolNotFound, &p), "不明なツールです: unity_fly");
    }

    #[test]
    fn language_parses_case_insensitively() {
        assert_eq!("JA".parse::<Language>().unwrap(), Language::Ja);
        assert!("fr".parse::<Language>().is_err());
    }
}
