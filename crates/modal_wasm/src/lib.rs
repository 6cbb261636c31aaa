//! WASM bindings for the polynomial system builder.

use modal_core::parser::ParseSettings;
use modal_core::system::PolynomialSystem;
use serde::Serialize;
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmPolynomialSystem {
    system: PolynomialSystem,
}

/// Serializable complex number for JS consumers.
#[derive(Serialize)]
struct ComplexWire {
    re: f64,
    im: f64,
}

#[wasm_bindgen]
impl WasmPolynomialSystem {
    #[wasm_bindgen(constructor)]
    pub fn new(n_variables: usize, strict: bool) -> Result<WasmPolynomialSystem, JsValue> {
        console_error_panic_hook::set_once();

        let settings = if strict {
            ParseSettings::strict()
        } else {
            ParseSettings::default()
        };
        let system = PolynomialSystem::with_settings(n_variables, settings)
            .map_err(|e| JsValue::from_str(&format!("System creation failed: {}", e)))?;
        Ok(WasmPolynomialSystem { system })
    }

    pub fn add_equation(&mut self, text: &str) -> Result<(), JsValue> {
        self.system
            .add_equation(text)
            .map_err(|e| JsValue::from_str(&format!("Invalid equation: {}", e)))
    }

    pub fn n_variables(&self) -> usize {
        self.system.n_variables()
    }

    pub fn degrees(&self) -> Vec<usize> {
        self.system.degrees().collect()
    }

    pub fn render_summary(&self) -> String {
        self.system.render_summary()
    }

    /// Coefficient matrices as `{ n_variables, matrices: [{ degree, rows, columns, monomials, values }] }`.
    pub fn matrices(&self) -> Result<JsValue, JsValue> {
        to_value(&self.system.snapshot())
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    pub fn evaluate(&self, state: &[f64]) -> Result<Vec<f64>, JsValue> {
        self.system
            .evaluate(state)
            .map_err(|e| JsValue::from_str(&format!("Evaluation failed: {}", e)))
    }

    /// Row-major Jacobian of the vector field at `state`.
    pub fn jacobian(&self, state: &[f64]) -> Result<Vec<f64>, JsValue> {
        let jacobian = self
            .system
            .jacobian(state)
            .map_err(|e| JsValue::from_str(&format!("Jacobian failed: {}", e)))?;
        Ok(jacobian.transpose().as_slice().to_vec())
    }

    pub fn linear_spectrum(&self) -> Result<JsValue, JsValue> {
        let spectrum: Vec<ComplexWire> = self
            .system
            .linear_spectrum()
            .map_err(|e| JsValue::from_str(&format!("Spectrum failed: {}", e)))?
            .into_iter()
            .map(|z| ComplexWire { re: z.re, im: z.im })
            .collect();
        to_value(&spectrum).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }
}
