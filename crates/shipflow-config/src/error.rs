use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error("設定ファイルが見つかりません: {0}")]
    ConfigFileNotFound(PathBuf),

    #[error(
        "Docker の認証情報がありません。以下のキーを設定してください:\n\
        - docker.registry\n\
        - docker.username\n\
        - docker.password\n\
        または SHIPFLOW__DOCKER__* 環境変数で指定できます"
    )]
    MissingDockerAuth,

    #[error(
        "Heroku の認証情報がありません。以下のキーを設定してください:\n\
        - heroku.username\n\
        - heroku.password"
    )]
    MissingHerokuAuth,

    #[error("シークレットの形式が不正です: {0}")]
    InvalidSecret(String),

    #[error("設定の読み込みに失敗しました: {0}")]
    Load(#[from] config::ConfigError),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
