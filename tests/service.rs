use facegate::{
    common::config::{
        Config, DetectorConfig, ExtractorConfig, LivenessConfig, MatchingConfig, ModelConfig,
        StorageConfig,
    },
    core::capabilities::{Embedding, FaceLocalizer, FaceRegion, FeatureExtractor, LivenessGate},
    CryptoEnvelope, EncryptedBiometricStore, FaceGateError, FaceGateService, RejectionReason,
    Result, VerifyOutcome,
};

use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Stub capabilities: the matching core must work against any implementation
// of the boundary traits.
// ---------------------------------------------------------------------------

/// Treats the whole image as the face.
struct WholeImageLocalizer;

impl FaceLocalizer for WholeImageLocalizer {
    fn detect(&self, image: &DynamicImage) -> Result<Option<FaceRegion>> {
        Ok(Some(FaceRegion::whole(image.clone())))
    }
}

/// Never finds a face.
struct BlindLocalizer;

impl FaceLocalizer for BlindLocalizer {
    fn detect(&self, _image: &DynamicImage) -> Result<Option<FaceRegion>> {
        Ok(None)
    }
}

/// Mean channel values as a 3-dimensional embedding; distinct solid colors
/// map to well-separated points.
struct MeanColorExtractor;

impl FeatureExtractor for MeanColorExtractor {
    fn extract(&self, region: &FaceRegion) -> Result<Option<Embedding>> {
        let rgb = region.image.to_rgb8();
        let n = (rgb.width() * rgb.height()) as f32;
        let mut sums = [0.0f32; 3];
        for pixel in rgb.pixels() {
            sums[0] += pixel[0] as f32;
            sums[1] += pixel[1] as f32;
            sums[2] += pixel[2] as f32;
        }
        Ok(Some(vec![
            sums[0] / n / 255.0,
            sums[1] / n / 255.0,
            sums[2] / n / 255.0,
        ]))
    }
}

struct FixedLiveness(f32);

impl LivenessGate for FixedLiveness {
    fn check(&self, _region: &FaceRegion) -> Result<f32> {
        Ok(self.0)
    }
}

struct DownLiveness;

impl LivenessGate for DownLiveness {
    fn check(&self, _region: &FaceRegion) -> Result<f32> {
        Err(FaceGateError::LivenessUnavailable("connection refused".into()))
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn test_config(dir: &Path) -> Config {
    Config {
        models: ModelConfig {
            detector_path: dir.join("detector.onnx"),
            extractor_path: dir.join("extractor.onnx"),
            optimization_level: 3,
        },
        detector: DetectorConfig {
            input_width: 640,
            input_height: 640,
            detection_confidence: 0.5,
        },
        extractor: ExtractorConfig {
            input_size: 112,
            normalization_value: 127.5,
        },
        matching: MatchingConfig {
            distance_threshold: 0.6,
            match_tolerance: 0.5,
            enforce_liveness_on_verify: false,
        },
        liveness: LivenessConfig::default(),
        storage: StorageConfig {
            db_path: dir.join("faces.db"),
            key_path: dir.join("facegate.key"),
        },
    }
}

fn build_service(config: Config) -> FaceGateService {
    build_service_with(
        config,
        Box::new(WholeImageLocalizer),
        Box::new(FixedLiveness(1.0)),
    )
}

fn build_service_with(
    config: Config,
    localizer: Box<dyn FaceLocalizer>,
    liveness: Box<dyn LivenessGate>,
) -> FaceGateService {
    let crypto = Arc::new(CryptoEnvelope::load_or_generate(&config.storage.key_path).unwrap());
    let store = Arc::new(EncryptedBiometricStore::open(&config.storage.db_path).unwrap());
    FaceGateService::new(
        config,
        store,
        crypto,
        localizer,
        Box::new(MeanColorExtractor),
        liveness,
    )
    .unwrap()
}

fn solid_png(r: u8, g: u8, b: u8) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(16, 16, image::Rgb([r, g, b])));
    let mut bytes = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut bytes),
        image::ImageOutputFormat::Png,
    )
    .unwrap();
    bytes
}

fn red() -> Vec<u8> {
    solid_png(220, 10, 10)
}

fn green() -> Vec<u8> {
    solid_png(10, 220, 10)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn registered_face_is_accepted_with_near_zero_distance() {
    let dir = tempfile::tempdir().unwrap();
    let service = build_service(test_config(dir.path()));

    service.register("alice", &red()).unwrap();

    match service.verify(&red()) {
        VerifyOutcome::Accepted { username, distance } => {
            assert_eq!(username, "alice");
            assert!(distance < 1e-4, "distance was {}", distance);
        }
        other => panic!("expected acceptance, got {:?}", other),
    }
}

#[test]
fn empty_registry_rejects_any_probe() {
    let dir = tempfile::tempdir().unwrap();
    let service = build_service(test_config(dir.path()));

    match service.verify(&red()) {
        VerifyOutcome::Rejected { reason, distance } => {
            assert_eq!(reason, RejectionReason::EmptyRegistry);
            assert_eq!(distance, None);
        }
        other => panic!("expected rejection, got {:?}", other),
    }

    // The probe is audited as unauthorized.
    assert_eq!(service.list_unauthorized().unwrap().len(), 1);
}

#[test]
fn unrelated_probe_is_rejected_and_audited_once() {
    let dir = tempfile::tempdir().unwrap();
    let service = build_service(test_config(dir.path()));

    service.register("alice", &red()).unwrap();

    match service.verify(&green()) {
        VerifyOutcome::Rejected { reason, distance } => {
            assert_eq!(reason, RejectionReason::NotRegistered);
            let distance = distance.expect("known-population rejection carries a distance");
            assert!(distance >= 0.6, "distance was {}", distance);
        }
        other => panic!("expected rejection, got {:?}", other),
    }

    let records = service.list_unauthorized().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].image, green());
}

#[test]
fn duplicate_username_rejected_and_first_enrollment_survives() {
    let dir = tempfile::tempdir().unwrap();
    let service = build_service(test_config(dir.path()));

    service.register("alice", &red()).unwrap();
    let err = service.register("alice", &green()).unwrap_err();
    assert!(matches!(err, FaceGateError::UsernameTaken(_)));

    // The first image still matches; the rejected second one does not.
    assert!(matches!(
        service.verify(&red()),
        VerifyOutcome::Accepted { .. }
    ));
}

#[test]
fn corrupt_stored_record_is_skipped_on_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    {
        let service = build_service(config.clone());
        service.register("alice", &red()).unwrap();
        service.register("bob", &green()).unwrap();
        assert_eq!(service.enrolled_count(), 2);
        service.shutdown();
    }

    // Flip one byte of bob's stored envelope out-of-band.
    {
        let conn = rusqlite::Connection::open(&config.storage.db_path).unwrap();
        let mut blob: Vec<u8> = conn
            .query_row(
                "SELECT face_image FROM user_faces WHERE username = 'bob'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        conn.execute(
            "UPDATE user_faces SET face_image = ?1 WHERE username = 'bob'",
            rusqlite::params![blob],
        )
        .unwrap();
    }

    let service = build_service(config);
    assert_eq!(service.enrolled_count(), 1);
    assert!(matches!(
        service.verify(&red()),
        VerifyOutcome::Accepted { .. }
    ));
    assert!(matches!(
        service.verify(&green()),
        VerifyOutcome::Rejected { .. }
    ));
}

#[test]
fn concurrent_registrations_both_become_visible() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(build_service(test_config(dir.path())));

    let s1 = Arc::clone(&service);
    let s2 = Arc::clone(&service);
    let t1 = std::thread::spawn(move || s1.register("carol", &red()));
    let t2 = std::thread::spawn(move || s2.register("dave", &green()));
    t1.join().unwrap().unwrap();
    t2.join().unwrap().unwrap();

    assert_eq!(service.enrolled_count(), 2);
    match service.verify(&red()) {
        VerifyOutcome::Accepted { username, .. } => assert_eq!(username, "carol"),
        other => panic!("expected carol, got {:?}", other),
    }
    match service.verify(&green()) {
        VerifyOutcome::Accepted { username, .. } => assert_eq!(username, "dave"),
        other => panic!("expected dave, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Boundary behavior
// ---------------------------------------------------------------------------

#[test]
fn no_face_rejects_without_audit_entry() {
    let dir = tempfile::tempdir().unwrap();
    let service = build_service_with(
        test_config(dir.path()),
        Box::new(BlindLocalizer),
        Box::new(FixedLiveness(1.0)),
    );

    match service.verify(&red()) {
        VerifyOutcome::Rejected { reason, .. } => {
            assert_eq!(reason, RejectionReason::NoFaceDetected)
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    assert!(service.list_unauthorized().unwrap().is_empty());

    let err = service.register("alice", &red()).unwrap_err();
    assert!(matches!(err, FaceGateError::NoFaceDetected));
}

#[test]
fn malformed_input_becomes_attack_record_not_a_crash() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let crypto = Arc::new(CryptoEnvelope::load_or_generate(&config.storage.key_path).unwrap());
    let store = Arc::new(EncryptedBiometricStore::open(&config.storage.db_path).unwrap());
    let service = FaceGateService::new(
        config,
        Arc::clone(&store),
        crypto,
        Box::new(WholeImageLocalizer),
        Box::new(MeanColorExtractor),
        Box::new(FixedLiveness(1.0)),
    )
    .unwrap();

    match service.verify(b"definitely not an image") {
        VerifyOutcome::Rejected { reason, .. } => {
            assert_eq!(reason, RejectionReason::InternalError)
        }
        other => panic!("expected internal rejection, got {:?}", other),
    }

    assert_eq!(store.attack_count().unwrap(), 1);
    assert_eq!(store.unauthorized_count().unwrap(), 0);
}

#[test]
fn liveness_gates_registration_but_not_default_verify() {
    let dir = tempfile::tempdir().unwrap();

    // Sub-threshold liveness blocks registration.
    let service = build_service_with(
        test_config(dir.path()),
        Box::new(WholeImageLocalizer),
        Box::new(FixedLiveness(0.3)),
    );
    let err = service.register("alice", &red()).unwrap_err();
    assert!(matches!(err, FaceGateError::LivenessFailed));
    service.shutdown();

    // With the default config the verify path skips the gate entirely.
    let dir2 = tempfile::tempdir().unwrap();
    let live = build_service(test_config(dir2.path()));
    live.register("alice", &red()).unwrap();
    live.shutdown();

    let gated = build_service_with(
        test_config(dir2.path()),
        Box::new(WholeImageLocalizer),
        Box::new(FixedLiveness(0.3)),
    );
    assert!(matches!(
        gated.verify(&red()),
        VerifyOutcome::Accepted { .. }
    ));
}

#[test]
fn liveness_enforced_on_verify_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());

    let enroll = build_service(config.clone());
    enroll.register("alice", &red()).unwrap();
    enroll.shutdown();

    config.matching.enforce_liveness_on_verify = true;
    let service = build_service_with(
        config,
        Box::new(WholeImageLocalizer),
        Box::new(FixedLiveness(0.3)),
    );

    match service.verify(&red()) {
        VerifyOutcome::Rejected { reason, .. } => {
            assert_eq!(reason, RejectionReason::LivenessFailed)
        }
        other => panic!("expected liveness rejection, got {:?}", other),
    }
}

#[test]
fn unavailable_liveness_service_fails_registration_closed() {
    let dir = tempfile::tempdir().unwrap();
    let service = build_service_with(
        test_config(dir.path()),
        Box::new(WholeImageLocalizer),
        Box::new(DownLiveness),
    );

    let err = service.register("alice", &red()).unwrap_err();
    assert!(matches!(err, FaceGateError::LivenessFailed));
}

#[test]
fn face_exists_uses_loose_tolerance_only() {
    let dir = tempfile::tempdir().unwrap();
    let service = build_service(test_config(dir.path()));

    service.register("alice", &red()).unwrap();

    assert!(service.face_exists(&red()).unwrap());
    assert!(!service.face_exists(&green()).unwrap());
}

#[test]
fn username_check_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let service = build_service(test_config(dir.path()));

    assert!(!service.username_exists("alice").unwrap());
    service.register("alice", &red()).unwrap();
    assert!(service.username_exists("alice").unwrap());
}

#[test]
fn record_attack_accepts_optional_evidence() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let crypto = Arc::new(CryptoEnvelope::load_or_generate(&config.storage.key_path).unwrap());
    let store = Arc::new(EncryptedBiometricStore::open(&config.storage.db_path).unwrap());
    let service = FaceGateService::new(
        config,
        Arc::clone(&store),
        crypto,
        Box::new(WholeImageLocalizer),
        Box::new(MeanColorExtractor),
        Box::new(FixedLiveness(1.0)),
    )
    .unwrap();

    service.record_attack("suspicious payload", None).unwrap();
    service
        .record_attack("replayed frame", Some(&red()))
        .unwrap();

    assert_eq!(store.attack_count().unwrap(), 2);
}
