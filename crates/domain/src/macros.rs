/// UUID v7 ベースの ID 型を定義する宣言型マクロ
///
/// 生成されるもの:
/// - `Uuid` をラップする Newtype（`Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`,
///   `Serialize`, `Deserialize`, `Display`）
/// - `new()`: UUID v7 を生成。生成順にソートできるのでログの突き合わせに使える
/// - `as_uuid()`: 内部 UUID への参照
/// - `FromStr`: ログに出力された文字列表現から復元
/// - `Default`（`new()` に委譲）
///
/// # 使用例
///
/// ```rust
/// use courier_domain::notification::MailJobId;
///
/// let id = MailJobId::new();
/// let restored: MailJobId = id.to_string().parse().unwrap();
/// assert_eq!(id, restored);
/// assert_eq!(restored.as_uuid().get_version_num(), 7);
/// ```
macro_rules! define_uuid_id {
    (
        $(#[$meta:meta])*
        $vis:vis struct $Name:ident;
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash,
            serde::Serialize, serde::Deserialize,
            derive_more::Display,
        )]
        #[display("{_0}")]
        $vis struct $Name(uuid::Uuid);

        impl $Name {
            /// 新しい ID を生成する（UUID v7）
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl std::str::FromStr for $Name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                uuid::Uuid::parse_str(s).map(Self)
            }
        }

        impl Default for $Name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}
