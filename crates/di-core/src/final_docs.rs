use tracing::{debug, info};

use crate::classification::ClassifiedPage;
use crate::collaborators::{ClientError, DocumentAssembler, MergedDocument};
use crate::config::DocumentType;

/// One output document cut from the merged source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalDocument {
    pub document_type: DocumentType,
    /// 0-based pages of the merged document, ascending.
    pub pages: Vec<usize>,
    pub bytes: Vec<u8>,
}

/// 0-based pages whose label is exactly `name`. Page numbers outside
/// `1..=page_count` are dropped without error.
pub fn page_indices(pages: &[ClassifiedPage], name: &str, page_count: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = pages
        .iter()
        .filter(|page| page.label == name)
        .filter_map(|page| (page.page as usize).checked_sub(1))
        .filter(|index| *index < page_count)
        .collect();
    indices.sort_unstable();
    indices.dedup();
    indices
}

/// Cut one document per configured type; types without pages produce nothing.
pub async fn build_final_documents(
    assembler: &dyn DocumentAssembler,
    merged: &MergedDocument,
    pages: &[ClassifiedPage],
    document_types: &[DocumentType],
) -> Result<Vec<FinalDocument>, ClientError> {
    let mut documents = Vec::new();

    for document_type in document_types {
        let indices = page_indices(pages, &document_type.name, merged.page_count);
        if indices.is_empty() {
            debug!(document_type = %document_type.name, "no pages for document type");
            continue;
        }

        let bytes = assembler.extract_pages(merged, &indices).await?;
        info!(
            document_type = %document_type.name,
            pages = indices.len(),
            "built final document"
        );
        documents.push(FinalDocument {
            document_type: document_type.clone(),
            pages: indices,
            bytes,
        });
    }

    Ok(documents)
}
