//! One-shot agent provisioning.
//!
//! [`SetupOrchestrator::setup_agent`] runs a linear pipeline across the three
//! services:
//!
//! 1. mint a client id;
//! 2. create the messaging instance (aborts on failure);
//! 3. create the client's workflow bound to that instance (aborts on failure);
//! 4. point the instance's webhook at the workflow, when a URL was resolved;
//! 5. ingest the business profile as knowledge, when knowledge text was given;
//! 6. activate the workflow.
//!
//! Steps 4 to 6 never abort setup. Their outcomes are logged and reported
//! through [`AgentSetup::knowledge_processed`] and
//! [`AgentSetup::workflow_active`]. Nothing is rolled back.

use std::sync::Arc;

use crate::error::SetupError;
use crate::knowledge::KnowledgeBase;
use crate::messaging::MessagingBridge;
use crate::models::{AgentSetup, BusinessProfile, Metadata};
use crate::workflow::WorkflowEngine;

pub struct SetupOrchestrator {
    messaging: Arc<dyn MessagingBridge>,
    workflows: Arc<dyn WorkflowEngine>,
    knowledge: Arc<KnowledgeBase>,
}

/// Knowledge document ingested at setup time.
pub fn compose_profile_document(profile: &BusinessProfile) -> String {
    format!(
        "\nInformações da Empresa:\n\
         Nome: {}\n\
         Descrição: {}\n\
         Horário de Funcionamento: {}\n\
         Contacto: {}\n\
         \n\
         Conhecimento Adicional:\n\
         {}\n",
        profile.business_name,
        profile.business_description,
        profile.business_hours,
        profile.contact_info,
        profile.knowledge_text
    )
}

impl SetupOrchestrator {
    pub fn new(
        messaging: Arc<dyn MessagingBridge>,
        workflows: Arc<dyn WorkflowEngine>,
        knowledge: Arc<KnowledgeBase>,
    ) -> Self {
        Self {
            messaging,
            workflows,
            knowledge,
        }
    }

    pub async fn setup_agent(&self, profile: &BusinessProfile) -> Result<AgentSetup, SetupError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let business_name = Some(profile.business_name.as_str()).filter(|n| !n.is_empty());
        tracing::info!(client_id = %client_id, business = %profile.business_name, "agent setup started");

        let instance = self
            .messaging
            .create_instance(&client_id, business_name)
            .await
            .map_err(SetupError::Instance)?;

        let workflow = self
            .workflows
            .create_client_workflow(&client_id, &instance.instance_id, business_name)
            .await
            .map_err(SetupError::Workflow)?;

        match &workflow.webhook_url {
            Some(url) => {
                if let Err(e) = self
                    .messaging
                    .configure_webhook(&instance.instance_id, url, None)
                    .await
                {
                    tracing::warn!(instance = %instance.instance_id, "Failed to configure webhook: {}", e);
                }
            }
            None => {
                tracing::warn!(workflow_id = %workflow.workflow_id, "no webhook URL resolved; webhook not configured");
            }
        }

        let knowledge_processed = if profile.knowledge_text.is_empty() {
            false
        } else {
            let mut metadata = Metadata::new();
            metadata.insert("business_name".into(), profile.business_name.clone().into());
            metadata.insert("source_type".into(), "setup_form".into());
            match self
                .knowledge
                .process_text_content(&client_id, &compose_profile_document(profile), metadata)
                .await
            {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!(client_id = %client_id, "knowledge ingestion failed: {}", e);
                    false
                }
            }
        };

        let workflow_active = match self.workflows.activate_workflow(&workflow.workflow_id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(workflow_id = %workflow.workflow_id, "workflow activation failed: {}", e);
                false
            }
        };

        tracing::info!(
            client_id = %client_id,
            knowledge_processed,
            workflow_active,
            "agent setup completed"
        );

        Ok(AgentSetup {
            client_id,
            instance_id: instance.instance_id,
            workflow_id: workflow.workflow_id,
            qr_code: instance.qr_code,
            webhook_url: workflow.webhook_url,
            knowledge_processed,
            workflow_active,
        })
    }
}
