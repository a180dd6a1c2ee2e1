use crate::model::SourceRef;

pub const PROCESSED_SUBFOLDER: &str = "processed_document";

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn extension_for(content_type: &str) -> &'static str {
    let content_type = content_type.to_ascii_lowercase();
    if content_type.contains("pdf") {
        ".pdf"
    } else if content_type.contains("jpeg") || content_type.contains("jpg") {
        ".jpg"
    } else if content_type.contains("png") {
        ".png"
    } else if content_type.contains("tif") {
        ".tif"
    } else {
        ""
    }
}

/// Local file name for a downloaded source: the blob's own name when it has an
/// extension, otherwise one inferred from the content type. The position
/// prefix keeps upload order and avoids collisions between same-named blobs.
pub fn local_file_name(position: usize, source: &SourceRef) -> String {
    let name = base_name(&source.path);
    let has_extension = name
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && !ext.is_empty());

    let name = if has_extension {
        name.to_string()
    } else {
        let ext = extension_for(source.content_type.as_deref().unwrap_or_default());
        format!("{name}{ext}")
    };
    format!("{position:03}_{name}")
}

/// Folder part of a blob path: `2025/11/12/613690000/scan.jpg` -> `2025/11/12/613690000`.
pub fn parent_prefix(blob_path: &str) -> &str {
    match blob_path.rsplit_once('/') {
        Some((parent, _)) => parent,
        None => "",
    }
}

/// Upload path for a final document under the submission's folder.
pub fn processed_blob_path(prefix: &str, file_name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{PROCESSED_SUBFOLDER}/{file_name}")
    } else {
        format!("{prefix}/{PROCESSED_SUBFOLDER}/{file_name}")
    }
}
