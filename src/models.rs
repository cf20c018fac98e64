use chrono::{DateTime, TimeZone, Utc};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

pub const ALBUMS_COLLECTION: &str = "albums";
pub const SETTINGS_COLLECTION: &str = "settings";
pub const GENERAL_SETTINGS_ID: &str = "general";
pub const DEFAULT_SUBTITLE: &str = "Picturewrite by Juno.";

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Lowercase hex of a finished SHA-256 digest.
pub fn hex_digest(hasher: Sha256) -> String {
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Fresh identifier for documents, photos and session tokens.
pub fn generate_id() -> String {
    let mut hasher = Sha256::new();
    hasher.update(
        Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .to_le_bytes(),
    );
    hasher.update(ID_SEQUENCE.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    hasher.update(rand::random::<u64>().to_le_bytes());
    let digest = hex_digest(hasher);
    digest[..20].to_string()
}

/// A photo as the rest of the crate sees it, after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    #[serde(default)]
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub likes: u64,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub added_at: Option<DateTime<Utc>>,
}

impl Photo {
    pub fn new(url: String) -> Self {
        Self {
            id: generate_id(),
            url,
            likes: 0,
            added_at: Some(Utc::now()),
        }
    }
}

/// Photo entry exactly as found in a stored photo list.
///
/// Early albums stored bare download URLs; later ones store objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredPhoto {
    Legacy(String),
    Structured(Photo),
}

impl StoredPhoto {
    pub fn normalize(self) -> Photo {
        match self {
            StoredPhoto::Legacy(url) => Photo {
                id: url.clone(),
                url,
                likes: 0,
                added_at: None,
            },
            StoredPhoto::Structured(mut photo) => {
                if photo.id.is_empty() {
                    photo.id = photo.url.clone();
                }
                photo
            }
        }
    }
}

impl From<Photo> for StoredPhoto {
    fn from(photo: Photo) -> Self {
        StoredPhoto::Structured(photo)
    }
}

pub fn normalize_photos(stored: Vec<StoredPhoto>) -> Vec<Photo> {
    stored.into_iter().map(StoredPhoto::normalize).collect()
}

/// Accepts RFC 3339 strings or epoch milliseconds; anything else counts as missing.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    })
}

/// Album document body in the `albums` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumDocument {
    pub title: String,
    #[serde(default)]
    pub is_secret: bool,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub photos: Vec<StoredPhoto>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Album {
    pub id: String,
    pub title: String,
    pub is_secret: bool,
    pub password: Option<String>,
    pub photos: Vec<Photo>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Album {
    pub fn from_document(id: String, doc: AlbumDocument) -> Self {
        Self {
            id,
            title: doc.title,
            is_secret: doc.is_secret,
            password: doc.password,
            photos: normalize_photos(doc.photos),
            created_at: doc.created_at,
        }
    }

    /// Whether a visitor holding `code` may see the photos.
    pub fn is_unlocked_by(&self, code: Option<&str>) -> bool {
        if !self.is_secret {
            return true;
        }
        matches!((self.password.as_deref(), code), (Some(pw), Some(c)) if pw == c.trim())
    }
}

/// Album fields typed by the admin before upload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumDraft {
    pub title: String,
    #[serde(default)]
    pub is_secret: bool,
    #[serde(default)]
    pub password: Option<String>,
}

impl AlbumDraft {
    /// Password that actually gets stored: only secret albums keep one,
    /// trimmed the same way visitor codes are.
    pub fn effective_password(&self) -> Option<String> {
        if !self.is_secret {
            return None;
        }
        self.password
            .as_deref()
            .map(str::trim)
            .filter(|pw| !pw.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    pub subtitle: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            subtitle: DEFAULT_SUBTITLE.to_string(),
        }
    }
}

/// What the admin copies and sends after an upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareSummary {
    pub id: String,
    pub title: String,
    pub password: Option<String>,
    pub share_url: String,
}

impl ShareSummary {
    pub fn new(origin: &str, id: &str, title: &str, password: Option<&str>) -> Self {
        let origin = origin.trim_end_matches('/');
        let share_url = match password {
            Some(pw) => format!(
                "{}/album/{}?code={}",
                origin,
                id,
                utf8_percent_encode(pw, NON_ALPHANUMERIC)
            ),
            None => format!("{}/album/{}", origin, id),
        };
        Self {
            id: id.to_string(),
            title: title.to_string(),
            password: password.map(str::to_string),
            share_url,
        }
    }

    pub fn for_album(origin: &str, album: &Album) -> Self {
        let password = if album.is_secret {
            album.password.as_deref()
        } else {
            None
        };
        Self::new(origin, &album.id, &album.title, password)
    }

    pub fn share_text(&self) -> String {
        let mut text = format!("[Picturewrite] Photos arrived!\nLink: {}", self.share_url);
        if let Some(pw) = &self.password {
            text.push_str(&format!("\nCode: {}", pw));
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_legacy_and_structured_photos_normalize() {
        let stored: Vec<StoredPhoto> = serde_json::from_value(json!([
            "http://a/1.jpg",
            {"id": "x", "url": "http://a/2.jpg", "likes": 3}
        ]))
        .unwrap();

        let photos = normalize_photos(stored);

        assert_eq!(photos.len(), 2);
        assert_eq!(photos[0].id, "http://a/1.jpg");
        assert_eq!(photos[0].url, "http://a/1.jpg");
        assert_eq!(photos[0].likes, 0);
        assert_eq!(photos[0].added_at, None);
        assert_eq!(photos[1].id, "x");
        assert_eq!(photos[1].url, "http://a/2.jpg");
        assert_eq!(photos[1].likes, 3);
    }

    #[test]
    fn test_structured_photo_without_id_uses_url() {
        let stored: StoredPhoto = serde_json::from_value(json!({"url": "http://a/3.jpg"})).unwrap();
        let photo = stored.normalize();
        assert_eq!(photo.id, "http://a/3.jpg");
    }

    #[test]
    fn test_added_at_accepts_millis_and_ignores_garbage() {
        let millis: Photo =
            serde_json::from_value(json!({"id": "a", "url": "u", "addedAt": 1_700_000_000_000i64}))
                .unwrap();
        assert_eq!(
            millis.added_at.map(|dt| dt.timestamp_millis()),
            Some(1_700_000_000_000)
        );

        let garbage: Photo =
            serde_json::from_value(json!({"id": "a", "url": "u", "addedAt": {"seconds": 1}}))
                .unwrap();
        assert_eq!(garbage.added_at, None);
    }

    #[test]
    fn test_draft_drops_password_when_not_secret() {
        let draft = AlbumDraft {
            title: "Trip".to_string(),
            is_secret: false,
            password: Some("typed-before-toggle".to_string()),
        };
        assert_eq!(draft.effective_password(), None);

        let secret = AlbumDraft {
            is_secret: true,
            ..draft
        };
        assert_eq!(
            secret.effective_password().as_deref(),
            Some("typed-before-toggle")
        );
    }

    #[test]
    fn test_secret_password_is_trimmed_once() {
        let draft = AlbumDraft {
            title: "Family".to_string(),
            is_secret: true,
            password: Some(" 0420 ".to_string()),
        };
        assert_eq!(draft.effective_password().as_deref(), Some("0420"));

        let blank = AlbumDraft {
            password: Some("   ".to_string()),
            ..draft
        };
        assert_eq!(blank.effective_password(), None);
    }

    #[test]
    fn test_share_url_encodes_the_code() {
        let secret = ShareSummary::new("http://h", "abc", "Trip", Some("a&b #1"));
        assert_eq!(secret.share_url, "http://h/album/abc?code=a%26b%20%231");
        assert!(secret.share_text().ends_with("\nCode: a&b #1"));
    }

    #[test]
    fn test_hex_digest_matches_known_value() {
        let mut hasher = Sha256::new();
        hasher.update(b"abc");
        assert_eq!(
            hex_digest(hasher),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_share_summary_urls() {
        let public = ShareSummary::new("http://localhost:18480/", "abc", "Trip", None);
        assert_eq!(public.share_url, "http://localhost:18480/album/abc");
        assert_eq!(
            public.share_text(),
            "[Picturewrite] Photos arrived!\nLink: http://localhost:18480/album/abc"
        );

        let secret = ShareSummary::new("http://localhost:18480", "abc", "Trip", Some("1234"));
        assert_eq!(secret.share_url, "http://localhost:18480/album/abc?code=1234");
        assert!(secret.share_text().ends_with("\nCode: 1234"));
    }

    #[test]
    fn test_secret_album_unlock() {
        let album = Album {
            id: "a".to_string(),
            title: "t".to_string(),
            is_secret: true,
            password: Some("pw".to_string()),
            photos: vec![],
            created_at: None,
        };
        assert!(album.is_unlocked_by(Some("pw")));
        assert!(album.is_unlocked_by(Some(" pw ")));
        assert!(!album.is_unlocked_by(Some("nope")));
        assert!(!album.is_unlocked_by(None));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_eq!(a.len(), 20);
        assert_ne!(a, b);
    }
}
