//! `build_workflow`: the pure, I/O-free function that constructs the
//! engine's wire document from a job row (`spec.md` §4.4 step 3).
//! Must be deterministic — same job fields, byte-identical JSON — so
//! this is the one function in the worker proptest-covers directly
//! (P8).

use forge_render_client::WorkflowDocument;
use forge_types::Job;
use serde_json::json;

pub fn build_workflow(job: &Job) -> WorkflowDocument {
    let loras: Vec<serde_json::Value> = job
        .loras
        .iter()
        .map(|l| {
            json!({
                "name": l.name,
                "model_strength": l.model_strength,
                "clip_strength": l.clip_strength,
            })
        })
        .collect();

    WorkflowDocument::new(json!({
        "prompt": job.prompt,
        "negative_prompt": job.negative_prompt,
        "checkpoint": job.checkpoint,
        "loras": loras,
        "width": job.width,
        "height": job.height,
        "batch_size": job.batch_size,
        "sampler": {
            "seed": job.sampler.seed,
            "steps": job.sampler.steps,
            "cfg": job.sampler.cfg,
            "sampler_name": job.sampler.sampler_name,
            "scheduler_name": job.sampler.scheduler_name,
            "denoise": job.sampler.denoise,
        },
        "params": job.params,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use forge_types::{JobStatus, LoraAdapter, SamplerConfig, UserId};
    use proptest::prelude::*;

    fn job_with(prompt: String, seed: i64, steps: u32, width: u32) -> Job {
        Job {
            id: 1,
            user_id: UserId(uuid::Uuid::nil()),
            prompt,
            negative_prompt: None,
            checkpoint: "sd_xl.safetensors".to_string(),
            loras: vec![LoraAdapter {
                name: "style".to_string(),
                model_strength: 0.8,
                clip_strength: 0.8,
            }],
            width,
            height: 512,
            batch_size: 1,
            sampler: SamplerConfig {
                seed,
                steps,
                cfg: 7.0,
                sampler_name: "euler_ancestral".to_string(),
                scheduler_name: "normal".to_string(),
                denoise: 1.0,
            },
            params: serde_json::json!({}),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            recovery_hints: vec![],
            content_id: None,
            output_paths: vec![],
            thumbnail_paths: vec![],
            task_handle: None,
            engine_prompt_id: None,
        }
    }

    proptest! {
        #[test]
        fn build_workflow_is_a_pure_function_of_job_fields(
            prompt in "[a-z ]{1,40}",
            seed in -1i64..10_000,
            steps in 1u32..150,
            width in (1u32..32).prop_map(|n| n * 64),
        ) {
            let job_a = job_with(prompt.clone(), seed, steps, width);
            let job_b = job_with(prompt, seed, steps, width);

            let doc_a = serde_json::to_vec(&build_workflow(&job_a).0).unwrap();
            let doc_b = serde_json::to_vec(&build_workflow(&job_b).0).unwrap();
            prop_assert_eq!(doc_a, doc_b);
        }
    }

    #[test]
    fn workflow_document_carries_every_sampler_field() {
        let job = job_with("a cat".to_string(), -1, 20, 512);
        let doc = build_workflow(&job).into_inner();
        assert_eq!(doc["sampler"]["steps"], 20);
        assert_eq!(doc["sampler"]["sampler_name"], "euler_ancestral");
        assert_eq!(doc["loras"][0]["name"], "style");
    }
}
