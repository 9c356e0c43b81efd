// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 CAB Ingénierie / Christophe ABOULICAM
//! Built-in rules
//!
//! A small starter set of policies written in code. Each one is a plain
//! field predicate over the provider's resource properties.

use serde_json::Value;

use crate::error::RegistryError;
use crate::policy::descriptor::PolicyDescriptor;
use crate::policy::metadata::{EnforcementLevel, Severity};
use crate::policy::registry::{PolicyHandle, PolicyRegistry};
use crate::policy::schema::{ConfigSchema, ParamKind, ParamSpec};

pub const AWS_S3_BUCKET: &str = "aws:s3/bucket:Bucket";
pub const AWS_EC2_INSTANCE: &str = "aws:ec2/instance:Instance";
pub const AWS_EC2_SECURITY_GROUP: &str = "aws:ec2/securityGroup:SecurityGroup";
pub const AZURE_STORAGE_ACCOUNT: &str = "azure-native:storage:StorageAccount";
pub const GCP_STORAGE_BUCKET: &str = "gcp:storage/bucket:Bucket";
pub const K8S_DEPLOYMENT: &str = "kubernetes:apps/v1:Deployment";

/// Build every built-in descriptor, in registration order
pub fn builtin_policies() -> Result<Vec<PolicyDescriptor>, RegistryError> {
    Ok(vec![
        PolicyDescriptor::builder("aws-s3-bucket-disallow-public-read")
            .description("Checks that S3 buckets do not allow public read access.")
            .enforcement_level(EnforcementLevel::Advisory)
            .severity(Severity::Critical)
            .vendors(["aws"])
            .services(["s3"])
            .topics(["storage", "security"])
            .frameworks(["pcidss", "iso27001"])
            .resource_type(AWS_S3_BUCKET)
            .validate_fn(|bucket, _, sink| {
                if let Some(acl) = bucket.property("acl").and_then(Value::as_str) {
                    if acl == "public-read" || acl == "public-read-write" {
                        sink.report(format!("S3 buckets should not allow public read (acl is '{acl}')."));
                    }
                }
                Ok(())
            })
            .build()?,
        PolicyDescriptor::builder("aws-s3-bucket-enforce-tags")
            .description("Checks that S3 buckets carry the required tags.")
            .severity(Severity::Low)
            .vendors(["aws"])
            .services(["s3"])
            .topics(["governance"])
            .resource_type(AWS_S3_BUCKET)
            .config_schema(ConfigSchema::new().param(
                "requiredTags",
                ParamSpec::optional(ParamKind::StringArray, serde_json::json!(["owner"]))
                    .with_description("Tag keys every bucket must define"),
            ))
            .validate_fn(|bucket, args, sink| {
                let required: Vec<String> = args.param_as("requiredTags")?;
                let tags = bucket.property("tags");
                for key in required {
                    if tags.and_then(|t| t.get(&key)).is_none() {
                        sink.report(format!("S3 bucket is missing required tag '{key}'."));
                    }
                }
                Ok(())
            })
            .build()?,
        PolicyDescriptor::builder("aws-ec2-instance-disallow-public-ip")
            .description("Checks that EC2 instances do not have a public IP address.")
            .severity(Severity::High)
            .vendors(["aws"])
            .services(["ec2"])
            .topics(["network"])
            .frameworks(["pcidss"])
            .resource_type(AWS_EC2_INSTANCE)
            .validate_fn(|instance, _, sink| {
                if instance.property("associatePublicIpAddress") == Some(&Value::Bool(true)) {
                    sink.report("EC2 instances should not have a public IP address.");
                }
                Ok(())
            })
            .build()?,
        PolicyDescriptor::builder("aws-ec2-security-group-disallow-inbound-http-traffic")
            .description("Checks that security groups do not allow inbound HTTP traffic.")
            .severity(Severity::Critical)
            .vendors(["aws"])
            .services(["ec2"])
            .topics(["network"])
            .frameworks(["pcidss"])
            .resource_type(AWS_EC2_SECURITY_GROUP)
            .validate_fn(|group, _, sink| {
                let rules = group.property("ingress").and_then(Value::as_array);
                for (i, rule) in rules.into_iter().flatten().enumerate() {
                    let from = rule.get("fromPort").and_then(Value::as_i64);
                    let to = rule.get("toPort").and_then(Value::as_i64);
                    if let (Some(from), Some(to)) = (from, to) {
                        if from <= 80 && 80 <= to {
                            sink.report(format!(
                                "Security group ingress rule {i} allows inbound HTTP traffic."
                            ));
                        }
                    }
                }
                Ok(())
            })
            .build()?,
        PolicyDescriptor::builder("azure-native-storage-account-disallow-public-blob-access")
            .description("Checks that storage accounts do not allow public blob access.")
            .severity(Severity::High)
            .vendors(["azure"])
            .services(["storage"])
            .topics(["storage", "security"])
            .resource_type(AZURE_STORAGE_ACCOUNT)
            .validate_fn(|account, _, sink| {
                if account.property("allowBlobPublicAccess") != Some(&Value::Bool(false)) {
                    sink.report("Storage accounts should explicitly disallow public blob access.");
                }
                Ok(())
            })
            .build()?,
        PolicyDescriptor::builder("google-storage-bucket-enable-uniform-level-access")
            .description("Checks that storage buckets use uniform bucket-level access.")
            .severity(Severity::Medium)
            .vendors(["google"])
            .services(["storage"])
            .topics(["storage", "permissions"])
            .resource_type(GCP_STORAGE_BUCKET)
            .validate_fn(|bucket, _, sink| {
                if bucket.property("uniformBucketLevelAccess") != Some(&Value::Bool(true)) {
                    sink.report("Storage buckets should enable uniform bucket-level access.");
                }
                Ok(())
            })
            .build()?,
        PolicyDescriptor::builder("kubernetes-apps-deployment-min-replicas")
            .description("Checks that deployments run a minimum number of replicas.")
            .severity(Severity::Medium)
            .vendors(["kubernetes"])
            .services(["apps"])
            .topics(["availability"])
            .resource_type(K8S_DEPLOYMENT)
            .config_schema(ConfigSchema::new().param(
                "minReplicas",
                ParamSpec::optional(ParamKind::Integer, 2)
                    .with_description("Minimum replica count"),
            ))
            .validate_fn(|deployment, args, sink| {
                let min: i64 = args.param_as("minReplicas")?;
                // replicas defaults to 1 when unset
                let replicas = deployment
                    .property("spec.replicas")
                    .and_then(Value::as_i64)
                    .unwrap_or(1);
                if replicas < min {
                    sink.report(format!(
                        "Deployment should run at least {min} replicas (found {replicas})."
                    ));
                }
                Ok(())
            })
            .build()?,
    ])
}

/// Register every built-in policy
pub fn register_builtin(registry: &mut PolicyRegistry) -> Result<Vec<PolicyHandle>, RegistryError> {
    registry.register_all(builtin_policies()?)
}
