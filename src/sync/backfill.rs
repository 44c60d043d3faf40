use tracing::info;

use super::{Orchestrator, SyncError};

impl Orchestrator {
    /// Upload previews that exist locally but were never uploaded, e.g.
    /// after an interrupted run or a heal. Entries that already carry a
    /// remote reference for a preview are not uploaded again.
    pub async fn backfill_uploads(&mut self) -> Result<usize, SyncError> {
        if self.sink.is_none() {
            return Ok(0);
        }
        let pending: Vec<String> = self
            .store
            .iter()
            .filter(|(_, entry)| entry.pending_upload())
            .map(|(id, _)| id.clone())
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }
        info!("Uploading previews for {} entries", pending.len());

        let mut total = 0;
        for identifier in &pending {
            if self.sink.is_none() {
                break;
            }
            let uploaded = self.upload_previews(identifier).await?;
            if uploaded > 0 {
                self.store.save()?;
                total += uploaded;
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::state::{MappingEntry, SourceDescriptor};
    use crate::sync::tests::{FakeSink, Fixture};

    fn seed_with_previews(fx: &Fixture, orch: &mut crate::sync::Orchestrator, id: &str, thumb_ref: Option<&str>) {
        let thumb = fx.dir.path().join(format!("{}_thumb.jpg", id));
        let qr = fx.dir.path().join(format!("{}_qr.jpg", id));
        std::fs::write(&thumb, b"thumb").unwrap();
        std::fs::write(&qr, b"qr").unwrap();
        let mut entry = MappingEntry::new(SourceDescriptor::remote(format!("f-{}", id)), "a.jpg");
        entry.thumbnail_path = Some(thumb);
        entry.qr_crop_path = Some(qr);
        entry.remote_thumb_ref = thumb_ref.map(str::to_string);
        assert!(orch.store.try_insert(id, entry));
    }

    #[tokio::test]
    async fn test_backfill_uploads_only_missing_refs() {
        let fx = Fixture::new();
        let sink = Arc::new(FakeSink::default());
        let mut orch = fx.orchestrator().with_sink(Box::new(sink.clone()));
        seed_with_previews(&fx, &mut orch, "A-1", None);
        seed_with_previews(&fx, &mut orch, "A-2", Some("existing"));

        let uploaded = orch.backfill_uploads().await.unwrap();
        assert_eq!(uploaded, 3);
        assert_eq!(
            *sink.uploads.lock().unwrap(),
            vec!["A-1_thumb.jpg".to_string(), "A-1_qr.jpg".to_string(), "A-2_qr.jpg".to_string()]
        );
        assert_eq!(orch.store().get("A-2").unwrap().remote_thumb_ref.as_deref(), Some("existing"));

        // Nothing left to upload.
        assert_eq!(orch.backfill_uploads().await.unwrap(), 0);
        assert_eq!(sink.uploads.lock().unwrap().len(), 3);

        let saved = std::fs::read_to_string(fx.store_path()).unwrap();
        assert!(saved.contains("remote-3"));
    }

    #[tokio::test]
    async fn test_backfill_stops_when_unauthorized() {
        let fx = Fixture::new();
        let sink = Arc::new(FakeSink {
            deny: true,
            ..Default::default()
        });
        let mut orch = fx.orchestrator().with_sink(Box::new(sink.clone()));
        seed_with_previews(&fx, &mut orch, "A-1", None);
        seed_with_previews(&fx, &mut orch, "A-2", None);

        assert_eq!(orch.backfill_uploads().await.unwrap(), 0);
        assert!(orch.store().get("A-1").unwrap().pending_upload());
        assert_eq!(orch.backfill_uploads().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_backfill_without_sink_is_noop() {
        let fx = Fixture::new();
        let mut orch = fx.orchestrator();
        seed_with_previews(&fx, &mut orch, "A-1", None);
        assert_eq!(orch.backfill_uploads().await.unwrap(), 0);
    }
}
