// src/rut.rs

use once_cell::sync::Lazy;
use regex::Regex;

use crate::gtr_client::GtrError;

// Canonical shape after stripping dots and spaces: body-dv.
static RUT_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,8})-([\dkK])$").expect("RUT regex is valid"));

/// A verified Chilean RUT. Construction goes through [`Rut::normalizar`],
/// so holding one implies the check digit was validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rut {
    numero: u32,
    dv: char,
}

impl Rut {
    /// Accepts operator input in any of the usual shapes ("12345678-5",
    /// "12.345.678-5", "123456785") and validates the módulo-11 check
    /// digit. Everything else is rejected as [`GtrError::InvalidRut`].
    pub fn normalizar(raw: &str) -> Result<Self, GtrError> {
        let limpio: String = raw
            .trim()
            .chars()
            .filter(|c| *c != '.' && *c != ' ')
            .collect();

        if !limpio.is_ascii() {
            return Err(GtrError::InvalidRut(raw.to_string()));
        }

        let canonical = if limpio.contains('-') {
            limpio
        } else if limpio.len() >= 2 {
            // Bare digit runs: the last character is the check digit.
            format!("{}-{}", &limpio[..limpio.len() - 1], &limpio[limpio.len() - 1..])
        } else {
            return Err(GtrError::InvalidRut(raw.to_string()));
        };

        let Some(caps) = RUT_SHAPE.captures(&canonical) else {
            return Err(GtrError::InvalidRut(raw.to_string()));
        };

        let numero: u32 = caps[1]
            .parse()
            .map_err(|_| GtrError::InvalidRut(raw.to_string()))?;
        let dv = caps[2].chars().next().unwrap_or('0').to_ascii_uppercase();

        if digito_verificador(numero) != dv {
            return Err(GtrError::InvalidRut(raw.to_string()));
        }

        Ok(Self { numero, dv })
    }

    /// Display form with thousands dots, as the backend expects in
    /// `rut_con_formato`: 12345678 -> "12.345.678-5".
    pub fn con_formato(&self) -> String {
        let digits = self.numero.to_string();
        let mut grouped = String::new();
        for (i, c) in digits.chars().enumerate() {
            let remaining = digits.len() - i;
            if i > 0 && remaining % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(c);
        }
        format!("{}-{}", grouped, self.dv)
    }
}

impl std::fmt::Display for Rut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.con_formato())
    }
}

// Módulo 11 over the digits in reverse, weights cycling 2..=7.
fn digito_verificador(numero: u32) -> char {
    let mut suma: u32 = 0;
    let mut factor: u32 = 2;
    let mut resto = numero;
    while resto > 0 {
        suma += (resto % 10) * factor;
        resto /= 10;
        factor = if factor == 7 { 2 } else { factor + 1 };
    }
    match 11 - (suma % 11) {
        11 => '0',
        10 => 'K',
        d => char::from_digit(d, 10).unwrap_or('0'),
    }
}
