//! Content selection from the local filesystem
//!
//! Layout, per user:
//!
//! ```text
//! {content_root}/{username}/{folder}/caption.txt
//! {content_root}/{username}/{folder}/image1.jpg
//! {content_root}/{username}/{folder}/image2.jpg
//! {replies_root}/{username}/reply.txt
//! {replies_root}/{username}/reply_image.jpg
//! ```
//!
//! Every call re-scans the directories, so folders added or removed between
//! runs are picked up without a restart.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ContentError, Result};
use crate::types::{ContentItem, ReplyContent};

pub const CAPTION_FILE: &str = "caption.txt";
pub const REPLY_TEXT_FILE: &str = "reply.txt";
pub const IMAGE_STEMS: [&str; 2] = ["image1", "image2"];
pub const REPLY_IMAGE_STEM: &str = "reply_image";
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// Source of post and reply content for a user
pub trait ContentSource: Send + Sync {
    /// Pick one eligible content folder at random
    fn select_content(&self, username: &str) -> Result<ContentItem>;

    /// Load the user's reply, or `None` when they have no reply folder
    fn select_reply(&self, username: &str) -> Result<Option<ReplyContent>>;

    /// Whether a reply folder exists for the user
    fn has_reply_source(&self, username: &str) -> bool;
}

/// Caption used when a folder has no readable caption file
pub fn default_caption(folder: &str) -> String {
    format!("This is a default caption for {}", folder)
}

/// One eligible content folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFolder {
    pub folder: String,
    pub caption: String,
    pub images: Vec<PathBuf>,
}

/// Snapshot of every user's eligible folders, written at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentIndex {
    pub generated_at: String,
    pub users: BTreeMap<String, Vec<ContentFolder>>,
}

impl ContentIndex {
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}

/// Content read from per-user directories
#[derive(Debug, Clone)]
pub struct FilesystemContent {
    content_root: PathBuf,
    replies_root: PathBuf,
}

impl FilesystemContent {
    pub fn new(content_root: impl Into<PathBuf>, replies_root: impl Into<PathBuf>) -> Self {
        Self {
            content_root: content_root.into(),
            replies_root: replies_root.into(),
        }
    }

    pub fn user_root(&self, username: &str) -> PathBuf {
        self.content_root.join(username)
    }

    pub fn reply_folder(&self, username: &str) -> PathBuf {
        self.replies_root.join(username)
    }

    /// List the user's eligible folders, sorted by folder name
    ///
    /// A folder is eligible when it holds a caption file or at least one of
    /// the expected images. A missing user directory yields an empty list.
    pub fn scan(&self, username: &str) -> Result<Vec<ContentFolder>> {
        let user_root = self.user_root(username);
        let entries = match std::fs::read_dir(&user_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ContentError::Io {
                    path: user_root,
                    source,
                }
                .into())
            }
        };

        let mut folders = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ContentError::Io {
                path: user_root.clone(),
                source,
            })?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let folder = entry.file_name().to_string_lossy().to_string();
            let images: Vec<PathBuf> = IMAGE_STEMS
                .iter()
                .filter_map(|stem| find_image(&path, stem))
                .collect();
            let has_caption = path.join(CAPTION_FILE).is_file();

            if images.is_empty() && !has_caption {
                debug!(folder = %path.display(), "skipping folder without caption or images");
                continue;
            }

            folders.push(ContentFolder {
                caption: read_caption(&path, &folder),
                folder,
                images,
            });
        }

        folders.sort_by(|a, b| a.folder.cmp(&b.folder));
        Ok(folders)
    }

    /// Scan every user and collect the results into an index
    pub fn build_index<'a>(&self, usernames: impl IntoIterator<Item = &'a str>) -> Result<ContentIndex> {
        let mut index = ContentIndex {
            generated_at: chrono::Local::now().to_rfc3339(),
            users: BTreeMap::new(),
        };

        for username in usernames {
            let folders = self.scan(username)?;
            info!(username, folders = folders.len(), "indexed content folders");
            index.users.insert(username.to_string(), folders);
        }

        Ok(index)
    }
}

impl ContentSource for FilesystemContent {
    fn select_content(&self, username: &str) -> Result<ContentItem> {
        let folders = self.scan(username)?;
        let chosen = folders
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| ContentError::NoContent {
                username: username.to_string(),
                root: self.user_root(username),
            })?;

        info!(
            username,
            folder = %chosen.folder,
            images = chosen.images.len(),
            candidates = folders.len(),
            "selected content folder"
        );

        ContentItem::new(&chosen.folder, &chosen.caption, chosen.images.clone())
    }

    fn select_reply(&self, username: &str) -> Result<Option<ReplyContent>> {
        let folder = self.reply_folder(username);
        if !folder.is_dir() {
            debug!(username, "no reply folder");
            return Ok(None);
        }

        let text_path = folder.join(REPLY_TEXT_FILE);
        let text = match std::fs::read_to_string(&text_path) {
            Ok(text) => text.trim().to_string(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ContentError::InvalidReply {
                    username: username.to_string(),
                    reason: format!("{} is missing", text_path.display()),
                }
                .into())
            }
            Err(source) => {
                return Err(ContentError::Io {
                    path: text_path,
                    source,
                }
                .into())
            }
        };

        if text.is_empty() {
            return Err(ContentError::InvalidReply {
                username: username.to_string(),
                reason: format!("{} is empty", text_path.display()),
            }
            .into());
        }

        let image_path = find_image(&folder, REPLY_IMAGE_STEM);
        if image_path.is_none() {
            debug!(username, "reply has no image, replying with text only");
        }

        Ok(Some(ReplyContent { text, image_path }))
    }

    fn has_reply_source(&self, username: &str) -> bool {
        self.reply_folder(username).is_dir()
    }
}

fn read_caption(folder_path: &Path, folder: &str) -> String {
    let caption_path = folder_path.join(CAPTION_FILE);
    match std::fs::read_to_string(&caption_path) {
        Ok(caption) if !caption.trim().is_empty() => caption.trim().to_string(),
        Ok(_) => {
            warn!(folder = %folder_path.display(), "caption file is empty, using default caption");
            default_caption(folder)
        }
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                warn!(folder = %folder_path.display(), error = %e, "could not read caption, using default caption");
            } else {
                debug!(folder = %folder_path.display(), "no caption file, using default caption");
            }
            default_caption(folder)
        }
    }
}

/// First `{stem}.{ext}` file in `dir` for a supported extension
fn find_image(dir: &Path, stem: &str) -> Option<PathBuf> {
    IMAGE_EXTENSIONS.iter().find_map(|ext| {
        [ext.to_string(), ext.to_uppercase()]
            .into_iter()
            .map(|ext| dir.join(format!("{}.{}", stem, ext)))
            .find(|candidate| candidate.is_file())
    })
}
