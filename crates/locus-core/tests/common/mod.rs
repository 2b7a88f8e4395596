#![allow(dead_code)]
use locus_core::LocationRecord;

/// Parses a record from a YAML fixture.
/// Panics if the YAML is invalid (intended for tests).
pub fn record_from_yaml(yaml: &str) -> LocationRecord {
    serde_yaml::from_str(yaml).expect("Failed to parse test record from YAML")
}

/// A complete, valid record as the backend would send it.
pub fn clinic() -> LocationRecord {
    record_from_yaml(
        r#"
id: loc-1
nome_local: Clinica Central
endereco_completo: Av. Paulista, 1000 - Bela Vista, Sao Paulo - SP
bairro: Bela Vista
cidade: Sao Paulo
estado: SP
cep: 01310-100
telefone: (11) 3333-4444
email: contato@central.com.br
website: https://central.com.br
coordenadas:
  lat: -23.5614
  lng: -46.6559
horario_funcionamento:
  segunda: { abertura: "08:00", fechamento: "18:00" }
  terca: { abertura: "08:00", fechamento: "18:00" }
  quarta: { abertura: "08:00", fechamento: "18:00" }
  quinta: { abertura: "08:00", fechamento: "18:00" }
  sexta: { abertura: "08:00", fechamento: "17:00", almoco: { inicio: "12:00", fim: "13:00" } }
  sabado: { abertura: "08:00", fechamento: "12:00" }
  domingo: { abertura: "00:00", fechamento: "00:00", fechado: true }
facilidades:
  - type: estacionamento
    available: true
    cost: pago
  - type: acessibilidade
    available: true
status: ativo
ultima_atualizacao: 2026-01-10T09:00:00Z
verificado_em: 2026-01-05T09:00:00Z
fonte_dados: api
"#,
    )
}
