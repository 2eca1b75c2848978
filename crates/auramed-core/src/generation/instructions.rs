//! System instructions for the clinic's generation call sites.

use serde::{Deserialize, Serialize};

use crate::types::PatientRecord;

const QUICK_CONSULT: &str = "Você é uma IA médica auxiliar. Responda com base em protocolos \
médicos padrão. Seja concisa.";

const TRIAGE: &str = "Você é a Aura, uma IA de triagem clínica empática.
1. Nunca dê diagnósticos definitivos (diga \"pode ser X\").
2. Sugira a especialidade médica adequada para agendar.
3. Se parecer grave (dor no peito, falta de ar), instrua ir ao hospital imediatamente.
4. Seja breve, acolhedora e humana.";

const CLINICAL_PLAN: &str = "Você é um assistente médico sênior. Responda em Markdown, de forma \
estruturada.";

const SOAP_NOTE: &str = "Você é um assistente de documentação clínica. Converta as anotações \
brutas do profissional em uma nota SOAP em Markdown com exatamente estas seções:
## S - Subjetivo
## O - Objetivo
## A - Avaliação
## P - Plano
Use apenas informações presentes nas anotações. Quando uma seção não tiver dados, escreva \
\"Não informado\". Não invente achados, doses ou diagnósticos.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClinicalInstruction {
    /// Second-opinion Q&A for doctors
    QuickConsult,
    /// Patient-facing symptom triage
    Triage,
    /// Diagnostic hypotheses, exams and prevention for one patient
    ClinicalPlan,
    /// Raw notes to Subjective / Objective / Assessment / Plan
    SoapNote,
}

impl ClinicalInstruction {
    pub fn system_instruction(&self) -> &'static str {
        match self {
            Self::QuickConsult => QUICK_CONSULT,
            Self::Triage => TRIAGE,
            Self::ClinicalPlan => CLINICAL_PLAN,
            Self::SoapNote => SOAP_NOTE,
        }
    }
}

/// User payload asking for a clinical plan for `patient`.
pub fn clinical_plan_payload(patient: &PatientRecord) -> String {
    format!(
        "Analise este paciente: nome: {}, idade: {}, histórico: {}, última consulta: {}. \
         Sugira: 1. Hipóteses diagnósticas baseadas no histórico. 2. Exames recomendados. \
         3. Orientações preventivas.",
        patient.name, patient.age, patient.history, patient.last_visit
    )
}

/// User payload wrapping raw clinical notes for SOAP structuring.
pub fn soap_note_payload(raw_notes: &str) -> String {
    format!("Anotações brutas da consulta:\n\"\"\"\n{}\n\"\"\"", raw_notes.trim())
}
