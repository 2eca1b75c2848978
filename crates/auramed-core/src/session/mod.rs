//! Clinic session: accounts, the patient corpus and the triage conversation.
//!
//! One `ClinicSession` per interactive user. Nothing here is global; callers
//! pass the shared [`RetrievalIndex`] and [`GenerationClient`] in.

pub mod credentials;
pub mod history;

pub use credentials::{Account, CredentialDirectory, Registration, Role};
pub use history::{ChatHistory, HistoryMessage};

use crate::config::SessionConfig;
use crate::error::{AuthError, SessionError};
use crate::generation::instructions::{clinical_plan_payload, soap_note_payload};
use crate::generation::{ChatRole, ClinicalInstruction, GenerationClient};
use crate::retrieval::RetrievalIndex;
use crate::types::{patient_documents, Document, PatientRecord};

const NEW_PATIENT_HISTORY: &str = "Novo cadastro. Histórico pendente.";
const NEW_PATIENT_LAST_VISIT: &str = "Nunca";

pub struct ClinicSession {
    directory: CredentialDirectory,
    patients: Vec<PatientRecord>,
    signed_in: Option<Account>,
    history: ChatHistory,
    config: SessionConfig,
}

impl ClinicSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            directory: CredentialDirectory::new(),
            patients: Vec::new(),
            signed_in: None,
            history: ChatHistory::default(),
            config,
        }
    }

    /// Session seeded with the demo clinic: three patients, one doctor.
    pub fn demo() -> Self {
        Self::demo_with_config(SessionConfig::default())
    }

    pub fn demo_with_config(config: SessionConfig) -> Self {
        let mut session = Self::new(config);
        session.patients = demo_patients();

        session.directory.insert(Account {
            username: "admin".into(),
            password: "admin".into(),
            role: Role::Doctor,
            display_name: "Dr. Gênesis".into(),
        });
        for (username, display_name) in [
            ("ana", "Ana Silva"),
            ("carlos", "Carlos Souza"),
            ("mariana", "Mariana Lima"),
        ] {
            session.directory.insert(Account {
                username: username.into(),
                password: "123".into(),
                role: Role::Patient,
                display_name: display_name.into(),
            });
        }
        session
    }

    /// Replace the patient corpus, e.g. with records loaded from disk.
    pub fn with_patients(mut self, patients: Vec<PatientRecord>) -> Self {
        self.patients = patients;
        self
    }

    pub fn patients(&self) -> &[PatientRecord] {
        &self.patients
    }

    pub fn patient(&self, id: u64) -> Option<&PatientRecord> {
        self.patients.iter().find(|p| p.id == id)
    }

    pub fn documents(&self) -> Vec<Document> {
        patient_documents(&self.patients)
    }

    pub fn directory(&self) -> &CredentialDirectory {
        &self.directory
    }

    pub fn current_account(&self) -> Option<&Account> {
        self.signed_in.as_ref()
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn sign_in(
        &mut self,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<&Account, AuthError> {
        let account = self.directory.authenticate(username, password, role)?.clone();
        tracing::info!(username = %account.username, role = %account.role, "Signed in");
        Ok(&*self.signed_in.insert(account))
    }

    /// Drops the signed-in account and the triage conversation, so the next
    /// account on this session never sees the previous patient's messages.
    pub fn sign_out(&mut self) {
        if let Some(account) = self.signed_in.take() {
            tracing::info!(username = %account.username, "Signed out");
        }
        self.history.clear();
    }

    /// Create an account. Patient accounts also get an empty record in the corpus.
    pub fn register(&mut self, registration: Registration) -> Result<&Account, AuthError> {
        let account = self
            .directory
            .register(registration, &self.config.doctor_license_key)?
            .clone();

        if account.role == Role::Patient {
            let id = self.patients.iter().map(|p| p.id).max().unwrap_or(0) + 1;
            self.patients.push(PatientRecord {
                id,
                name: account.display_name.clone(),
                age: 0,
                history: NEW_PATIENT_HISTORY.to_string(),
                last_visit: NEW_PATIENT_LAST_VISIT.to_string(),
            });
        }

        self.directory
            .get(&account.username)
            .ok_or(AuthError::UnknownUser)
    }

    fn require(&self, role: Role) -> Result<&Account, AuthError> {
        match &self.signed_in {
            None => Err(AuthError::NotSignedIn),
            Some(account) if account.role == role => Ok(account),
            Some(_) => Err(AuthError::Forbidden),
        }
    }

    /// Patients whose records match `query`, most similar first. Doctors only.
    pub fn search_patients(
        &self,
        index: &RetrievalIndex,
        query: &str,
    ) -> Result<Vec<PatientRecord>, SessionError> {
        self.require(Role::Doctor)?;
        // Map back by position; ids from loaded corpora need not be unique.
        let matches = index.search_scored(query, &self.documents())?;
        Ok(matches
            .iter()
            .filter_map(|result| self.patients.get(result.position).cloned())
            .collect())
    }

    /// Second-opinion question from a doctor.
    pub async fn quick_consult(
        &self,
        client: &GenerationClient,
        question: &str,
    ) -> Result<String, AuthError> {
        self.require(Role::Doctor)?;
        Ok(client
            .generate_for(ClinicalInstruction::QuickConsult, question)
            .await)
    }

    /// One triage turn for the signed-in patient. Only the current message is
    /// sent; the history is kept for display. Returns `None` for an empty message.
    pub async fn triage(
        &mut self,
        client: &GenerationClient,
        message: &str,
    ) -> Result<Option<String>, AuthError> {
        self.require(Role::Patient)?;
        if message.trim().is_empty() {
            return Ok(None);
        }

        self.history.push(ChatRole::User, message);
        let reply = client
            .generate_for(ClinicalInstruction::Triage, message)
            .await;
        self.history.push(ChatRole::Assistant, reply.clone());
        Ok(Some(reply))
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub async fn clinical_plan(
        &self,
        client: &GenerationClient,
        patient_id: u64,
    ) -> Result<String, AuthError> {
        self.require(Role::Doctor)?;
        let patient = self
            .patient(patient_id)
            .ok_or(AuthError::UnknownPatient(patient_id))?;
        Ok(client
            .generate_for(
                ClinicalInstruction::ClinicalPlan,
                &clinical_plan_payload(patient),
            )
            .await)
    }

    pub async fn soap_note(
        &self,
        client: &GenerationClient,
        raw_notes: &str,
    ) -> Result<String, AuthError> {
        self.require(Role::Doctor)?;
        Ok(client
            .generate_for(ClinicalInstruction::SoapNote, &soap_note_payload(raw_notes))
            .await)
    }
}

fn demo_patients() -> Vec<PatientRecord> {
    vec![
        PatientRecord {
            id: 1,
            name: "Ana Silva".into(),
            age: 32,
            history: "Enxaqueca crônica, alergia a penicilina. Relata estresse no trabalho.".into(),
            last_visit: "2023-10-15".into(),
        },
        PatientRecord {
            id: 2,
            name: "Carlos Souza".into(),
            age: 45,
            history: "Hipertensão leve, monitoramento de colesterol. \
                      Pratica atividade física regular."
                .into(),
            last_visit: "2023-11-02".into(),
        },
        PatientRecord {
            id: 3,
            name: "Mariana Lima".into(),
            age: 28,
            history: "Gestante 12 semanas, exames de rotina normais. Leve enjoo matinal.".into(),
            last_visit: "2023-11-10".into(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GenerationConfig, SearchConfig};
    use crate::error::{GenerationError, SearchError, CREDENTIAL_MISSING_MESSAGE};
    use crate::generation::{ChatCompletionProvider, CompletionRequest};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use crate::embeddings::EmbeddingModel;
    use std::sync::Arc;

    struct EchoProvider {
        payloads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatCompletionProvider for EchoProvider {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
            let payload = request.messages[1].content.clone();
            self.payloads.lock().push(payload.clone());
            Ok(format!("eco: {}", payload))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    /// Two-axis encoder: `[1, 0]` for texts mentioning "cefaleia", `[0, 1]` otherwise.
    struct CefaleiaEncoder;

    impl EmbeddingModel for CefaleiaEncoder {
        fn model_id(&self) -> &str {
            "cefaleia-v1"
        }

        fn dimension(&self) -> usize {
            2
        }

        fn encode(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|text| {
                    if text.to_lowercase().contains("cefaleia") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    fn patient(id: u64, name: &str, history: &str) -> PatientRecord {
        PatientRecord {
            id,
            name: name.into(),
            age: 40,
            history: history.into(),
            last_visit: "2024-01-10".into(),
        }
    }

    fn echo_client() -> (GenerationClient, Arc<EchoProvider>) {
        let provider = Arc::new(EchoProvider {
            payloads: Mutex::new(Vec::new()),
        });
        let client = GenerationClient::with_provider(provider.clone(), GenerationConfig::default());
        (client, provider)
    }

    #[test]
    fn test_demo_seed() {
        let session = ClinicSession::demo();
        assert_eq!(session.patients().len(), 3);
        assert_eq!(session.directory().len(), 4);
        assert_eq!(session.documents()[0].text.split(" - ").next(), Some("Ana Silva"));
        assert!(session.current_account().is_none());
    }

    #[test]
    fn test_patient_registration_appends_record() {
        let mut session = ClinicSession::demo();
        session
            .register(Registration {
                display_name: "João Pereira".into(),
                username: "joao".into(),
                password: "senha".into(),
                role: Some(Role::Patient),
                license_key: None,
            })
            .unwrap();

        let record = session.patient(4).unwrap();
        assert_eq!(record.name, "João Pereira");
        assert_eq!(record.age, 0);
        assert_eq!(record.history, "Novo cadastro. Histórico pendente.");
        assert_eq!(record.last_visit, "Nunca");
    }

    #[test]
    fn test_doctor_registration_does_not_touch_corpus() {
        let mut session = ClinicSession::demo();
        session
            .register(Registration {
                display_name: "Dra. Paula".into(),
                username: "paula".into(),
                password: "pw".into(),
                role: Some(Role::Doctor),
                license_key: Some("crm123".into()),
            })
            .unwrap();
        assert_eq!(session.patients().len(), 3);
    }

    #[test]
    fn test_search_requires_doctor() {
        let mut session = ClinicSession::demo();
        let index = RetrievalIndex::unloaded(SearchConfig::default());

        assert!(matches!(
            session.search_patients(&index, "dor"),
            Err(SessionError::Auth(AuthError::NotSignedIn))
        ));

        session.sign_in("ana", "123", Role::Patient).unwrap();
        assert!(matches!(
            session.search_patients(&index, "dor"),
            Err(SessionError::Auth(AuthError::Forbidden))
        ));

        session.sign_out();
        session.sign_in("admin", "admin", Role::Doctor).unwrap();
        assert!(matches!(
            session.search_patients(&index, "dor"),
            Err(SessionError::Search(SearchError::ModelUnavailable))
        ));
        // empty query never needs the encoder
        assert!(session.search_patients(&index, "").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_triage_keeps_history_and_sends_single_message() {
        let (client, provider) = echo_client();
        let mut session = ClinicSession::demo();
        session.sign_in("ana", "123", Role::Patient).unwrap();

        assert_eq!(session.triage(&client, "   ").await.unwrap(), None);
        assert!(session.history().is_empty());

        let reply = session.triage(&client, "Estou com dor de cabeça").await.unwrap();
        assert_eq!(reply.as_deref(), Some("eco: Estou com dor de cabeça"));
        session.triage(&client, "Piora à noite").await.unwrap();

        assert_eq!(session.history().len(), 4);
        assert_eq!(session.history().messages()[1].role, ChatRole::Assistant);
        assert_eq!(provider.payloads.lock().last().unwrap(), "Piora à noite");

        session.clear_history();
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_clinical_plan_uses_patient_record() {
        let (client, provider) = echo_client();
        let mut session = ClinicSession::demo();
        session.sign_in("admin", "admin", Role::Doctor).unwrap();

        assert_eq!(
            session.clinical_plan(&client, 99).await.unwrap_err(),
            AuthError::UnknownPatient(99)
        );

        session.clinical_plan(&client, 2).await.unwrap();
        assert!(provider.payloads.lock()[0].contains("nome: Carlos Souza, idade: 45"));
    }

    #[test]
    fn test_registration_into_sparse_ids_keeps_search_results_aligned() {
        let mut session = ClinicSession::demo().with_patients(vec![
            patient(2, "Ana", "Enxaqueca crônica."),
            patient(3, "Bia", "Hipertensão leve."),
        ]);
        session
            .register(Registration {
                display_name: "Caio cefaleia".into(),
                username: "caio".into(),
                password: "pw".into(),
                role: Some(Role::Patient),
                license_key: None,
            })
            .unwrap();

        let ids: Vec<u64> = session.patients().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 3, 4]);

        session.sign_in("admin", "admin", Role::Doctor).unwrap();
        let index = RetrievalIndex::new(Arc::new(CefaleiaEncoder), SearchConfig::default());
        let found = session.search_patients(&index, "cefaleia").unwrap();
        let names: Vec<&str> = found.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Caio cefaleia"]);
    }

    #[test]
    fn test_search_returns_matching_record_when_ids_repeat() {
        let mut session = ClinicSession::demo().with_patients(vec![
            patient(7, "Davi", "Dor lombar."),
            patient(7, "Eva", "Cefaleia tensional."),
        ]);
        session.sign_in("admin", "admin", Role::Doctor).unwrap();

        let index = RetrievalIndex::new(Arc::new(CefaleiaEncoder), SearchConfig::default());
        let found = session.search_patients(&index, "cefaleia").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Eva");
    }

    #[tokio::test]
    async fn test_sign_out_discards_triage_history() {
        let (client, _) = echo_client();
        let mut session = ClinicSession::demo();
        session.sign_in("ana", "123", Role::Patient).unwrap();
        session.triage(&client, "Tenho tosse").await.unwrap();
        assert_eq!(session.history().len(), 2);

        session.sign_out();
        assert!(session.current_account().is_none());
        assert!(session.history().is_empty());

        // the next account does not see the previous conversation
        session.sign_in("carlos", "123", Role::Patient).unwrap();
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_client_sentinel_reaches_caller() {
        let client = GenerationClient::unconfigured(GenerationConfig::default());
        let mut session = ClinicSession::demo();
        session.sign_in("admin", "admin", Role::Doctor).unwrap();
        assert_eq!(
            session.soap_note(&client, "pa 14x9").await.unwrap(),
            CREDENTIAL_MISSING_MESSAGE
        );
    }
}
