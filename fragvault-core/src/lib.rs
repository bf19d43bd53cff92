mod archive;
mod fragment;
mod policy;

pub use archive::{
    ArchiveEntries, ArchiveError, ArchiveReader, DEFAULT_MAX_EXPANDED_BYTES, ZipArchiveReader,
    looks_like_zip,
};
pub use fragment::{
    Fragment, FragmentVersion, PathError, content_digest, join_path, normalize_path, path_depth,
    relative_to,
};
pub use policy::{Capability, Policy, PolicyPair, PolicyParseError, Viewer, can};
