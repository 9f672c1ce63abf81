// Template instantiation

use automation_shared::{ActionStep, ActionType, TriggerType, WorkflowScope, WorkflowStatus};
use std::sync::Arc;
use uuid::Uuid;

use crate::tests::fixtures::TemplateFixture;
use crate::tests::helpers::{InMemoryWorkflowRepository, RecordingProviders};
use crate::workflows::{InstantiationOptions, TemplateInstantiator, ValidationError, WorkflowError, WorkflowRepository};

fn instantiator(repo: &Arc<InMemoryWorkflowRepository>) -> TemplateInstantiator {
    let repository: Arc<dyn WorkflowRepository> = repo.clone();
    TemplateInstantiator::new(repository, RecordingProviders::new().registry())
}

#[tokio::test]
async fn test_instantiation_copies_template_and_bumps_usage() {
    let repo = InMemoryWorkflowRepository::new();
    let template = TemplateFixture::global().usage_count(3).build();
    repo.insert_template(template.clone());
    let company = Uuid::new_v4();
    let user = Uuid::new_v4();

    let (workflow, instantiation) = instantiator(&repo)
        .instantiate(template.id, company, user, InstantiationOptions::default())
        .await
        .unwrap();

    assert_eq!(workflow.company_id, company);
    assert_eq!(workflow.owner_id, user);
    assert_eq!(workflow.name, template.name);
    assert_eq!(workflow.template_id, Some(template.id));
    assert_eq!(workflow.trigger_type, TriggerType::EntityCreated);
    assert_eq!(workflow.trigger_config, template.trigger_config);
    assert_eq!(workflow.actions, template.actions);
    assert_eq!(workflow.status, WorkflowStatus::Active);
    assert_eq!(workflow.execution_count, 0);

    assert_eq!(instantiation.template_id, template.id);
    assert_eq!(instantiation.workflow_id, workflow.id);
    assert_eq!(instantiation.instantiated_by, user);

    assert_eq!(repo.template(template.id).usage_count, 4);
    assert_eq!(repo.instantiations().len(), 1);
    assert_eq!(repo.workflow(workflow.id).name, workflow.name);
}

#[tokio::test]
async fn test_instantiating_twice_suffixes_the_name() {
    let repo = InMemoryWorkflowRepository::new();
    let template = TemplateFixture::global().build();
    repo.insert_template(template.clone());
    let company = Uuid::new_v4();
    let instantiator = instantiator(&repo);

    let (first, _) = instantiator
        .instantiate(template.id, company, Uuid::new_v4(), InstantiationOptions::default())
        .await
        .unwrap();
    let (second, _) = instantiator
        .instantiate(template.id, company, Uuid::new_v4(), InstantiationOptions::default())
        .await
        .unwrap();

    assert_eq!(first.name, template.name);
    assert_eq!(second.name, format!("{} (2)", template.name));
    assert_eq!(repo.template(template.id).usage_count, 2);
}

#[tokio::test]
async fn test_suffixed_name_stays_within_the_name_limit() {
    let repo = InMemoryWorkflowRepository::new();
    let mut template = TemplateFixture::global().build();
    template.name = "é".repeat(255);
    repo.insert_template(template.clone());
    let company = Uuid::new_v4();
    let instantiator = instantiator(&repo);

    let (first, _) = instantiator
        .instantiate(template.id, company, Uuid::new_v4(), InstantiationOptions::default())
        .await
        .unwrap();
    let (second, _) = instantiator
        .instantiate(template.id, company, Uuid::new_v4(), InstantiationOptions::default())
        .await
        .unwrap();

    assert_eq!(first.name, template.name);
    assert_eq!(second.name.chars().count(), 255);
    assert_eq!(second.name, format!("{} (2)", "é".repeat(251)));
    assert_ne!(first.name, second.name);
}

#[tokio::test]
async fn test_options_override_template_defaults() {
    let repo = InMemoryWorkflowRepository::new();
    let template = TemplateFixture::global().build();
    repo.insert_template(template.clone());
    let team = Uuid::new_v4();

    let options = InstantiationOptions {
        name: Some("  Team welcome  ".to_string()),
        scope: Some(WorkflowScope::Team),
        scope_id: Some(team),
        status: Some(WorkflowStatus::Paused),
        ..Default::default()
    };
    let (workflow, _) = instantiator(&repo)
        .instantiate(template.id, Uuid::new_v4(), Uuid::new_v4(), options)
        .await
        .unwrap();

    assert_eq!(workflow.name, "Team welcome");
    assert_eq!(workflow.scope, WorkflowScope::Team);
    assert_eq!(workflow.scope_id, Some(team));
    assert_eq!(workflow.status, WorkflowStatus::Paused);
}

#[tokio::test]
async fn test_other_tenants_template_is_not_found() {
    let repo = InMemoryWorkflowRepository::new();
    let template = TemplateFixture::global().owned_by(Uuid::new_v4()).usage_count(1).build();
    repo.insert_template(template.clone());

    let result = instantiator(&repo)
        .instantiate(template.id, Uuid::new_v4(), Uuid::new_v4(), InstantiationOptions::default())
        .await;

    assert!(matches!(result, Err(WorkflowError::NotFound(_))));
    assert_eq!(repo.template(template.id).usage_count, 1);
    assert!(repo.instantiations().is_empty());
}

#[tokio::test]
async fn test_invalid_requests_change_nothing() {
    let repo = InMemoryWorkflowRepository::new();
    let template = TemplateFixture::global().build();
    repo.insert_template(template.clone());
    let mut broken = TemplateFixture::global().build();
    broken.actions = vec![ActionStep::new(ActionType::SendEmail, serde_json::json!({ "to": "nobody" }))];
    repo.insert_template(broken.clone());
    let instantiator = instantiator(&repo);

    let team_without_id = InstantiationOptions {
        scope: Some(WorkflowScope::Team),
        ..Default::default()
    };
    let result = instantiator
        .instantiate(template.id, Uuid::new_v4(), Uuid::new_v4(), team_without_id)
        .await;
    assert!(matches!(result, Err(WorkflowError::Validation(ValidationError::InvalidField { .. }))));

    let result = instantiator
        .instantiate(broken.id, Uuid::new_v4(), Uuid::new_v4(), InstantiationOptions::default())
        .await;
    assert!(matches!(
        result,
        Err(WorkflowError::Validation(ValidationError::InvalidActionConfig { step: 0, .. }))
    ));

    assert!(repo.instantiations().is_empty());
    assert!(repo.workflows().is_empty());
}
