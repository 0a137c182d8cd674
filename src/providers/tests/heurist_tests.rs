// src/providers/tests/heurist_tests.rs

use super::super::heurist::HeuristImageGenerator;
use crate::providers::ImageRequest;

fn request() -> ImageRequest {
    ImageRequest {
        prompt: "a sunset".to_string(),
        width: 1024,
        height: 1024,
        seed: None,
        guidance_scale: None,
        num_iterations: None,
        negative_prompt: None,
    }
}

#[test]
fn test_job_request_defaults() {
    let generator = HeuristImageGenerator::new("key", "BluePencilRealistic").unwrap();
    let job = generator.job_request(&request(), 1_700_000_000_123);

    assert_eq!(job.model_id, "BluePencilRealistic");
    assert_eq!(job.job_id, "job_1700000000123");
    assert_eq!(job.deadline, 1_700_000_000 + 300);
    assert_eq!(job.model_input.sd.num_iterations, 22);
    assert_eq!(job.model_input.sd.guidance_scale, 7.5);
    assert!(job.model_input.sd.neg_prompt.contains("worst quality"));

    let json = serde_json::to_value(&job).unwrap();
    assert_eq!(json["model_input"]["SD"]["prompt"], "a sunset");
    assert!(json["model_input"]["SD"].get("seed").is_none());
}

#[test]
fn test_job_request_overrides() {
    let generator = HeuristImageGenerator::new("key", "FLUX.1-dev").unwrap();
    let mut custom = request();
    custom.seed = Some(42);
    custom.guidance_scale = Some(3.0);
    custom.num_iterations = Some(30);
    custom.negative_prompt = Some("text".to_string());
    custom.width = 512;

    let job = generator.job_request(&custom, 0);
    let json = serde_json::to_value(&job).unwrap();
    assert_eq!(json["model_input"]["SD"]["seed"], 42);
    assert_eq!(json["model_input"]["SD"]["guidance_scale"], 3.0);
    assert_eq!(json["model_input"]["SD"]["num_iterations"], 30);
    assert_eq!(json["model_input"]["SD"]["neg_prompt"], "text");
    assert_eq!(json["model_input"]["SD"]["width"], 512);
}
