//! Serialização JSON canônica usada para cálculo de hash.
//!
//! `serde_json::Map` é um `BTreeMap` quando o crate é compilado sem a
//! feature `preserve_order` (o caso aqui, já que nenhum `Cargo.toml` do
//! workspace a habilita). Isso significa que converter uma struct para
//! `serde_json::Value` e serializar o `Value` resultante já produz
//! chaves ordenadas lexicograficamente, recursivamente — exatamente o
//! encoder canonicalizante que o cálculo de hash exige para
//! interoperar entre implementações.
//!
//! O segundo ingrediente é numérico: campos declarados `f64` (como
//! `timestamp`) sempre serializam com `serde_json` trazendo um `.0`
//! final quando o valor é inteiro (`0.0`, não `0`), mas a fonte
//! original representa esses mesmos campos como `int`/`float` do
//! Python e `json.dumps` omite o `.0` quando o valor é um inteiro.
//! Sem normalizar isso, duas implementações conformes produziriam
//! hashes diferentes para o mesmo bloco lógico. `canonicalize_numbers`
//! reescreve qualquer número de valor inteiro para sua forma sem casas
//! decimais antes da serialização final.

use sha2::{Digest, Sha256};

/// Maior magnitude de ponto flutuante que ainda representa todo
/// inteiro exatamente — acima disso, não arriscamos reescrever.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0; // 2^53

fn canonicalize_numbers(value: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::Number(n) => Value::Number(canonical_number(n)),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(canonicalize_numbers).collect())
        }
        Value::Object(map) => {
            let canonical = map
                .into_iter()
                .map(|(key, value)| (key, canonicalize_numbers(value)))
                .collect();
            Value::Object(canonical)
        }
        other => other,
    }
}

/// Reescreve um número de valor inteiro (`0.0`, `10.0`, ...) para sua
/// forma sem parte fracionária (`0`, `10`, ...). Números já inteiros
/// ou com parte fracionária não-zero passam inalterados.
fn canonical_number(n: serde_json::Number) -> serde_json::Number {
    if let Some(f) = n.as_f64() {
        if f.is_finite() && f.fract() == 0.0 && f.abs() < MAX_EXACT_INTEGER {
            return serde_json::Number::from(f as i64);
        }
    }
    n
}

/// Serializa `value` como JSON compacto de chaves ordenadas e números
/// inteiros sem casas decimais, e retorna o SHA-256 em hexadecimal
/// minúsculo.
pub fn sha256_hex_of(value: &serde_json::Value) -> String {
    let canonical = canonicalize_numbers(value.clone());
    let bytes = serde_json::to_vec(&canonical).expect("Value já passou por serde_json::to_value");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_is_irrelevant_to_the_caller() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(sha256_hex_of(&a), sha256_hex_of(&b));
    }

    #[test]
    fn nested_objects_canonicalize_too() {
        let a = json!({"outer": {"z": 1, "y": 2}});
        let b = json!({"outer": {"y": 2, "z": 1}});
        assert_eq!(sha256_hex_of(&a), sha256_hex_of(&b));
    }

    #[test]
    fn whole_valued_floats_serialize_without_trailing_decimal() {
        let value = json!({"timestamp": 0.0});
        let canonical = canonicalize_numbers(value);
        assert_eq!(serde_json::to_string(&canonical).unwrap(), r#"{"timestamp":0}"#);
    }

    #[test]
    fn fractional_floats_are_left_untouched() {
        let value = json!({"timestamp": 12345.75});
        let canonical = canonicalize_numbers(value);
        assert_eq!(
            serde_json::to_string(&canonical).unwrap(),
            r#"{"timestamp":12345.75}"#
        );
    }

    #[test]
    fn matches_the_documented_genesis_digest() {
        let genesis = json!({
            "index": 0,
            "previous_hash": "0".repeat(64),
            "transactions": [],
            "nonce": 0,
            "timestamp": 0.0,
        });
        assert_eq!(
            sha256_hex_of(&genesis),
            "120a20ac98dae66f4b655cc4cd95d496fc4711db3d087bead6522d5dafcb058a"
        );
    }
}
