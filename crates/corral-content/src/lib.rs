//! Confined filesystem access for Corral scripts.
//!
//! A [`Content`] value gives a script `read`, `write`, and `list` methods over
//! the files below a single root directory. Scripts name files with absolute
//! virtual paths; the [`Resolver`] maps those onto the root and refuses any
//! path, or any symlink, that would lead outside it. All file I/O observes the
//! run's cancellation signal and is charged against the run's budget.
//!
//! ```rust,ignore
//! use corral_content::Content;
//! use corral_script::{Engine, Namespace};
//!
//! let content = Content::new("/srv/site").on_write(|entry| {
//!     println!("{}", entry.virtual_path);
//!     Ok(())
//! });
//! let mut namespace = Namespace::new();
//! namespace.insert_object("content", content.into_value());
//! Engine::new().run("build.rhai", &namespace, "content.write(\"/a.txt\", \"hi\");")?;
//! ```

mod content;
mod entry;
mod io;
mod resolve;

pub use content::{CONTENT_SAFETY, Content, ContentValue, LIST_BATCH, WriteCallback};
pub use entry::{Entry, FILE_MODE};
pub use io::{CHUNK_SIZE, DIR_MODE, Written, safe_read_file, safe_write_file};
pub use resolve::{Check, MAX_SYMLINK_HOPS, PathCheck, Resolver, normalise};

#[cfg(test)]
mod tests;
