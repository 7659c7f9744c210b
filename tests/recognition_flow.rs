use anyhow::Result;
use rollcall::config::Config;
use rollcall::service::{EnrollReport, IdentitySummary, UNKNOWN};
use rollcall::{FaceService, SidecarAnalyzer};
use std::path::PathBuf;

/// Dataset laid out as `<root>/dataset/<name>/<image>`, with the external
/// embedder's output in `<image>.faces.json`.
struct Fixture {
    dir: tempfile::TempDir,
    config: Config,
}

impl Fixture {
    fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let config = Config {
            threshold: 0.6,
            dataset_dir: dir.path().join("dataset"),
            embeddings_file: dir.path().join("embeddings.bin"),
            ..Config::default()
        };
        std::fs::create_dir_all(&config.dataset_dir)?;
        Ok(Self { dir, config })
    }

    /// Write an image (empty bytes) with one detection per embedding.
    fn image(&self, rel: &str, faces: &[&[f32]]) -> Result<PathBuf> {
        let path = self.config.dataset_dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap())?;
        std::fs::write(&path, b"")?;
        if !faces.is_empty() {
            let detections: Vec<serde_json::Value> = faces
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    serde_json::json!({
                        "bbox": [i as f32 * 50.0, 0.0, i as f32 * 50.0 + 40.0, 40.0],
                        "embedding": v,
                    })
                })
                .collect();
            std::fs::write(
                SidecarAnalyzer::new().sidecar_path(&path),
                serde_json::to_string(&detections)?,
            )?;
        }
        Ok(path)
    }

    fn capture(&self, faces: &[&[f32]]) -> Result<PathBuf> {
        let path = self.dir.path().join("capture.jpg");
        std::fs::write(&path, b"")?;
        let detections: Vec<serde_json::Value> = faces
            .iter()
            .map(|v| serde_json::json!({"bbox": [1, 2, 3, 4], "score": 0.88, "embedding": v}))
            .collect();
        std::fs::write(
            SidecarAnalyzer::new().sidecar_path(&path),
            serde_json::to_string(&detections)?,
        )?;
        Ok(path)
    }

    fn open(&self) -> Result<FaceService<SidecarAnalyzer>> {
        FaceService::open(&self.config, SidecarAnalyzer::new())
    }
}

fn summary(name: &str, image_count: usize, has_embedding: bool) -> IdentitySummary {
    IdentitySummary {
        name: name.to_string(),
        image_count,
        has_embedding,
    }
}

#[test]
fn test_open_rebuilds_missing_snapshot() -> Result<()> {
    env_logger::try_init().ok();
    let fx = Fixture::new()?;
    fx.image("alice/1.jpg", &[&[1.0, 0.0, 0.0]])?;
    fx.image("bob/1.png", &[&[0.0, 1.0, 0.0]])?;
    fx.image("carol/1.jpg", &[&[2.0, 0.0, 0.0]])?;
    fx.image("carol/2.jpg", &[])?;

    let service = fx.open()?;
    assert_eq!(service.health().dataset_size, 3);
    assert!(fx.config.embeddings_file.exists());

    let carol = service.store().snapshot();
    assert_eq!(carol.get("carol").unwrap().to_vec(), vec![2.0, 0.0, 0.0]);

    let report = service.recompute_all()?;
    let carol_report = report.identities.iter().find(|r| r.name == "carol").unwrap();
    assert_eq!((carol_report.usable, carol_report.images), (1, 2));
    Ok(())
}

#[test]
fn test_open_prefers_existing_snapshot() -> Result<()> {
    let fx = Fixture::new()?;
    fx.image("alice/1.jpg", &[&[1.0, 0.0, 0.0]])?;
    fx.open()?;

    // new images are ignored until a recompute
    fx.image("dave/1.jpg", &[&[0.0, 0.0, 1.0]])?;
    let service = fx.open()?;
    assert_eq!(service.health().dataset_size, 1);

    assert_eq!(service.recompute_all()?.total_embeddings, 2);
    Ok(())
}

#[test]
fn test_open_recovers_from_corrupt_snapshot() -> Result<()> {
    let fx = Fixture::new()?;
    fx.image("alice/1.jpg", &[&[1.0, 0.0, 0.0]])?;
    std::fs::write(&fx.config.embeddings_file, b"definitely not postcard")?;

    let service = fx.open()?;
    assert_eq!(service.health().dataset_size, 1);
    Ok(())
}

#[test]
fn test_recognize_group_photo() -> Result<()> {
    let fx = Fixture::new()?;
    fx.image("alice/1.jpg", &[&[1.0, 0.0, 0.0]])?;
    fx.image("bob/1.jpg", &[&[0.0, 1.0, 0.0]])?;
    let service = fx.open()?;

    let capture = fx.capture(&[&[0.9, 0.1, 0.0], &[0.0, 0.0, 1.0]])?;
    let recognition = service.recognize(&capture, service.threshold())?;

    assert_eq!(recognition.total_faces, 2);
    let alice = &recognition.recognized_faces[0];
    assert_eq!(alice.face_id, 0);
    assert_eq!(alice.name, "alice");
    assert_eq!(alice.confidence, 0.88);
    assert!((alice.recognition_confidence - 0.994).abs() < 1e-3);

    let stranger = &recognition.recognized_faces[1];
    assert_eq!(stranger.name, UNKNOWN);
    assert_eq!(stranger.recognition_confidence, 0.0);

    assert_eq!(recognition.attendance_records.len(), 1);
    assert_eq!(recognition.attendance_records[0].person_name, "alice");
    assert_eq!(recognition.attendance_records[0].bbox, [1.0, 2.0, 3.0, 4.0]);
    Ok(())
}

#[test]
fn test_recognize_against_empty_store() -> Result<()> {
    let fx = Fixture::new()?;
    let service = fx.open()?;
    let capture = fx.capture(&[&[1.0, 0.0, 0.0]])?;

    let recognition = service.recognize(&capture, 0.0)?;
    assert_eq!(recognition.recognized_faces[0].name, UNKNOWN);
    assert!(recognition.attendance_records.is_empty());
    Ok(())
}

#[test]
fn test_detect_reports_default_confidence() -> Result<()> {
    let fx = Fixture::new()?;
    let image = fx.image("erin/1.jpg", &[&[1.0, 0.0], &[0.0, 1.0]])?;
    let service = FaceService::new(&fx.config, SidecarAnalyzer::new());

    let faces = service.detect(&image)?;
    assert_eq!(faces.len(), 2);
    assert_eq!(faces[1].face_id, 1);
    assert_eq!(faces[1].confidence, 0.95);
    assert_eq!(faces[1].bbox, [50.0, 0.0, 90.0, 40.0]);
    Ok(())
}

#[test]
fn test_enroll_uses_first_face_and_overwrites() -> Result<()> {
    let fx = Fixture::new()?;
    fx.image("bob/1.jpg", &[&[0.0, 1.0, 0.0]])?;
    let service = fx.open()?;

    let first = fx.image("alice/1.jpg", &[&[1.0, 0.0, 0.0], &[0.0, 0.0, 1.0]])?;
    let blank = fx.image("alice/2.jpg", &[])?;
    let report = service.enroll("alice", &[first, blank])?;
    assert_eq!(
        report,
        EnrollReport {
            count_enrolled: 2,
            usable: 1,
            computed: true,
            persisted: true,
        }
    );
    assert_eq!(
        service.store().snapshot().get("alice").unwrap().to_vec(),
        vec![1.0, 0.0, 0.0]
    );

    let again = fx.image("alice/3.jpg", &[&[0.0, 1.0, 0.0]])?;
    service.enroll("alice", &[again])?;
    assert_eq!(
        service.store().snapshot().get("alice").unwrap().to_vec(),
        vec![0.0, 1.0, 0.0]
    );

    // survives a restart
    let reopened = fx.open()?;
    assert_eq!(
        reopened.store().snapshot().get("alice").unwrap().to_vec(),
        vec![0.0, 1.0, 0.0]
    );
    Ok(())
}

#[test]
fn test_enroll_without_faces_computes_nothing() -> Result<()> {
    let fx = Fixture::new()?;
    let service = fx.open()?;
    let blank = fx.image("zoe/1.jpg", &[])?;

    let report = service.enroll("zoe", &[blank])?;
    assert!(!report.computed);
    assert_eq!(report.usable, 0);
    assert_eq!(service.health().dataset_size, 0);
    Ok(())
}

#[test]
fn test_enroll_rejects_other_dimension() -> Result<()> {
    let fx = Fixture::new()?;
    fx.image("bob/1.jpg", &[&[0.0, 1.0, 0.0]])?;
    let service = fx.open()?;

    let odd = fx.image("mallory/1.jpg", &[&[1.0, 0.0]])?;
    assert!(service.enroll("mallory", &[odd]).is_err());
    assert!(!service.store().snapshot().contains("mallory"));
    Ok(())
}

#[test]
fn test_list_dataset() -> Result<()> {
    let fx = Fixture::new()?;
    fx.image("alice/1.jpg", &[&[1.0, 0.0, 0.0]])?;
    fx.image("alice/2.jpg", &[&[1.0, 0.1, 0.0]])?;
    fx.image("frank/1.jpg", &[])?;
    let service = fx.open()?;

    let outside = fx.dir.path().join("outside.jpg");
    std::fs::write(&outside, b"")?;
    std::fs::write(
        SidecarAnalyzer::new().sidecar_path(&outside),
        r#"[{"bbox": [0, 0, 1, 1], "embedding": [0.0, 1.0, 0.0]}]"#,
    )?;
    service.enroll("grace", &[outside])?;

    let info = service.list()?;
    assert_eq!(
        info.dataset,
        vec![
            summary("alice", 2, true),
            summary("frank", 1, false),
            summary("grace", 0, true),
        ]
    );
    assert_eq!(info.total_people, 3);
    assert_eq!(info.total_embeddings, 2);
    Ok(())
}

#[test]
fn test_recompute_drops_identity_enrolled_from_outside() -> Result<()> {
    let fx = Fixture::new()?;
    fx.image("alice/1.jpg", &[&[1.0, 0.0, 0.0]])?;
    let service = fx.open()?;

    let outside = fx.capture(&[&[0.0, 1.0, 0.0]])?;
    assert!(service.enroll("grace", &[outside.clone()])?.persisted);
    assert!(service.store().snapshot().contains("grace"));

    // the image stays where it was
    assert!(outside.exists());
    assert!(!fx.config.dataset_dir.join("grace").exists());

    let report = service.recompute_all()?;
    assert_eq!(report.total_embeddings, 1);
    assert!(!service.store().snapshot().contains("grace"));
    assert!(!fx.open()?.store().snapshot().contains("grace"));
    Ok(())
}
