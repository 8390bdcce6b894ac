use serde_json::json;
use tracing::{error, info};

use crate::models::Document;
use crate::repo::DocumentRepository;

/// Marks every stored revision of the same `(hierarchical_path, title)` pair
/// with a strictly lower revision number as obsolete, appending one audit
/// entry per superseded document.
///
/// Revision gaps are accepted: ingesting Rev.3 after Rev.1 obsoletes Rev.1
/// without requiring a Rev.2 to ever have been seen. Individual mark/log
/// failures are logged and do not stop the remaining records.
pub async fn resolve_obsolete(
    repo: &dyn DocumentRepository,
    new_document: &Document,
    acting_user_id: i64,
) -> usize {
    let siblings = match repo
        .find_documents_by_path_and_title(
            new_document.client_id,
            &new_document.hierarchical_path,
            &new_document.title,
        )
        .await
    {
        Ok(siblings) => siblings,
        Err(err) => {
            error!(
                document_id = new_document.id,
                error = %err,
                "failed to load sibling revisions, skipping obsolescence pass"
            );
            return 0;
        }
    };

    let mut obsoleted = 0;
    for sibling in siblings {
        if sibling.id == new_document.id
            || sibling.is_obsolete
            || sibling.revision >= new_document.revision
        {
            continue;
        }

        if let Err(err) = repo.mark_obsolete(sibling.id).await {
            error!(
                document_id = sibling.id,
                error = %err,
                "failed to mark document obsolete"
            );
            continue;
        }

        let message = format!(
            "'{}' {} superseded by {}",
            sibling.title,
            sibling.revision_label(),
            new_document.revision_label()
        );
        if let Err(err) = repo
            .append_log(
                Some(acting_user_id),
                "document_obsoleted",
                Some(sibling.id),
                json!({
                    "message": message,
                    "superseded_by": new_document.id,
                    "old_revision": sibling.revision,
                    "new_revision": new_document.revision,
                }),
            )
            .await
        {
            error!(
                document_id = sibling.id,
                error = %err,
                "failed to write obsolescence audit entry"
            );
        }

        info!(
            document_id = sibling.id,
            superseded_by = new_document.id,
            "document revision marked obsolete"
        );
        obsoleted += 1;
    }

    obsoleted
}
