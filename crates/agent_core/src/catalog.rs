//! Ordered, immutable stage catalog.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::CatalogError;

/// A stage as written in a catalog file, before ordering is assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub running_message: String,
    #[serde(default, alias = "static_result")]
    pub result: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageDescriptor {
    pub name: String,
    pub title: String,
    pub running_message: String,
    pub static_result: Value,
    pub order: usize,
}

impl StageDescriptor {
    fn from_definition(order: usize, name: String, definition: StageDefinition) -> Self {
        Self {
            name,
            title: definition.title,
            running_message: definition.running_message,
            static_result: definition.result,
            order,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    stages: Vec<StageDefinition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageCatalog {
    stages: Vec<StageDescriptor>,
}

impl StageCatalog {
    pub fn new(definitions: Vec<StageDefinition>) -> Result<Self, CatalogError> {
        if definitions.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::new();
        let mut stages = Vec::with_capacity(definitions.len());
        for (order, definition) in definitions.into_iter().enumerate() {
            let name = definition.name.trim().to_string();
            if name.is_empty() {
                return Err(CatalogError::BlankName { order });
            }
            if !seen.insert(name.clone()) {
                return Err(CatalogError::DuplicateName { name });
            }
            stages.push(StageDescriptor::from_definition(order, name, definition));
        }

        Ok(Self { stages })
    }

    /// Parses a TOML document made of `[[stages]]` tables.
    pub fn from_toml_str(raw: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(raw)?;
        Self::new(file.stages)
    }

    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    pub fn get(&self, order: usize) -> Option<&StageDescriptor> {
        self.stages.get(order)
    }

    pub fn by_name(&self, name: &str) -> Option<&StageDescriptor> {
        self.stages.iter().find(|stage| stage.name == name)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn is_last(&self, order: usize) -> bool {
        order + 1 == self.stages.len()
    }

    /// The six-stage IDOC triage walkthrough.
    pub fn idoc_triage() -> Self {
        let query = "psdata idoc sales order issues";
        let definitions = vec![
            StageDefinition {
                name: "mainCategoryML".into(),
                title: "Main Category: Analysis".into(),
                running_message: format!(
                    "Running: main_ml_triage_agent_predict_tool(incident_description=['{query}'])"
                ),
                result: json!({
                    "display": "counts",
                    "result": "ML Predicted Main Category: Idoc Issue"
                }),
            },
            StageDefinition {
                name: "mainCategoryNLP".into(),
                title: "Categorization".into(),
                running_message: format!(
                    "Running: main_nlp_triage_agent_predict_tool(issue_description={query})"
                ),
                result: json!({"result": "NLP Predicted Main Category: Idoc Issue"}),
            },
            StageDefinition {
                name: "previousTicket".into(),
                title: "Previous Ticket Analysis".into(),
                running_message: format!("Running: ticket_analysis_rag_agent(query={query})"),
                result: previous_ticket_analysis(),
            },
            StageDefinition {
                name: "mlSubCategory".into(),
                title: "Action".into(),
                running_message: format!(
                    "Running: ml_triage_agent_predict_tool(incident_description=['{query}'])"
                ),
                result: json!({"result": "ML Sub Category ML Triage Result: Incorrect Entry"}),
            },
            StageDefinition {
                name: "nlpSubCategory".into(),
                title: "NLP Sub Category NLP Triage Result".into(),
                running_message: format!(
                    "Running: nlp_triage_agent_predict_tool(issue_description={query})"
                ),
                result: json!({
                    "result": "NLP Sub Category NLP Triage Result: Application Document Not Posted"
                }),
            },
            StageDefinition {
                name: "response".into(),
                title: "IDOC Incorrect Entry Agent Result".into(),
                running_message: "Generating response...".into(),
                result: json!({
                    "display": "backlog",
                    "table_title": "Master Data Table: idoc_status",
                    "command_title": "Running:",
                    "command": format!("sync_idoc_with_sales(user_input={query})"),
                    "updated_table_title": "Updated Master Data Table: idoc_status"
                }),
            },
        ];

        Self {
            stages: definitions
                .into_iter()
                .enumerate()
                .map(|(order, definition)| {
                    let name = definition.name.clone();
                    StageDescriptor::from_definition(order, name, definition)
                })
                .collect(),
        }
    }
}

fn previous_ticket_analysis() -> Value {
    json!({
        "incidents": [
            {
                "incident_number": "Not specified",
                "error_message": "Purchase order still contains faulty items",
                "sap_details": {"sap_id": "MEPO", "sap_module": "Addon", "system_client": "SP1CLNT1/100"}
            },
            {
                "incident_number": "Not specified",
                "error_message": "Status \"Obsolete\" of material 5002858 does not allow external procurement",
                "sap_details": {"sap_id": "ME", "sap_module": "Addon", "system_client": "SP1CLNT1/100"}
            },
            {
                "incident_number": "Not specified",
                "error_message": "Tax jurisdiction code not allowed for tax calculation schema TAXUSJ",
                "sap_details": {"sap_id": "06", "sap_module": "Addon", "system_client": "SP1CLNT1/100"}
            }
        ],
        "analysis": [
            "Faulty Items: Ensure that all items in the purchase order are valid and correctly entered. This may include checking for entry errors or missing data.",
            "Material Status: Verify that the status of the material allows for external procurement. If a material is marked as \"Obsolete\", it might need to be updated or replaced with a valid material.",
            "Tax Jurisdiction: Validate the tax jurisdiction code setup in the system to ensure compliance with the tax calculation schema being used.",
            "General Troubleshooting: Always verify the related configurations in SAP for each identified module (e.g., Addon). Make sure the module and screen settings align with the operational requirements of the sales order."
        ],
        "conclusion": "These tickets suggest cross-verifying the current setup and data accuracy for IDOCs related to sales orders, focusing on areas like data entry and configuration settings for procurement and taxation."
    })
}

#[cfg(test)]
#[path = "tests/catalog_tests.rs"]
mod tests;
