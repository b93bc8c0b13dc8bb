//! Groth16 proving against the external circuit artifacts.
//!
//! The zkey (proving key + constraint matrices) is loaded once and shared;
//! each prover instance owns its own wasmer-backed witness calculator
//! because witness generation is stateful and not thread-safe.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ark_bn254::{Bn254, Fr};
use ark_circom::{read_zkey, CircomReduction, WitnessCalculator};
use ark_groth16::{prepare_verifying_key, Groth16, PreparedVerifyingKey, ProvingKey};
use ark_relations::r1cs::ConstraintMatrices;
use ark_serialize::CanonicalSerialize;
use ark_std::UniformRand;
use rand::rngs::OsRng;
use tracing::debug;
use wasmer::Store;

use crate::encode::{encode_proof, encode_public_signals, PROOF_BYTES_LEN};
use crate::error::CircuitError;
use crate::witness::SettlementWitness;

/// Shared, read-only proving material.
pub struct CircuitArtifacts {
    wasm_path: PathBuf,
    proving_key: ProvingKey<Bn254>,
    matrices: ConstraintMatrices<Fr>,
    prepared_vk: PreparedVerifyingKey<Bn254>,
}

impl CircuitArtifacts {
    /// Load `settlement_proof.wasm` + `settlement_proof_final.zkey`.
    pub fn load(
        wasm: impl AsRef<Path>,
        zkey: impl AsRef<Path>,
    ) -> Result<Arc<Self>, CircuitError> {
        let wasm_path = wasm.as_ref().to_path_buf();
        if !wasm_path.is_file() {
            return Err(CircuitError::WitnessGenerator(format!(
                "witness generator not found at {}",
                wasm_path.display()
            )));
        }
        let mut zkey_file = File::open(zkey.as_ref())?;
        let (proving_key, matrices) =
            read_zkey(&mut zkey_file).map_err(|err| CircuitError::Zkey(err.to_string()))?;
        let prepared_vk = prepare_verifying_key(&proving_key.vk);
        debug!(
            constraints = matrices.num_constraints,
            public_inputs = matrices.num_instance_variables - 1,
            "loaded settlement circuit artifacts"
        );
        Ok(Arc::new(Self {
            wasm_path,
            proving_key,
            matrices,
            prepared_vk,
        }))
    }

    pub fn wasm_path(&self) -> &Path {
        &self.wasm_path
    }

    /// Uncompressed verifying key as hex, for export to the on-chain
    /// verifier contract. The core never embeds it.
    pub fn verifying_key_hex(&self) -> Result<String, CircuitError> {
        let mut bytes = Vec::new();
        self.proving_key
            .vk
            .serialize_uncompressed(&mut bytes)
            .map_err(|err| CircuitError::Zkey(err.to_string()))?;
        Ok(hex::encode(bytes))
    }
}

/// A finished proof in on-chain form.
#[derive(Clone, Debug)]
pub struct SettlementProof {
    pub proof_bytes: [u8; PROOF_BYTES_LEN],
    pub public_signals: Vec<Fr>,
    pub public_signals_bytes: Vec<u8>,
    /// Circuit output: the last public signal.
    pub nullifier: Fr,
}

pub struct SettlementProver {
    artifacts: Arc<CircuitArtifacts>,
    store: Store,
    calculator: WitnessCalculator,
}

impl SettlementProver {
    pub fn new(artifacts: Arc<CircuitArtifacts>) -> Result<Self, CircuitError> {
        let mut store = Store::default();
        let calculator = WitnessCalculator::new(&mut store, artifacts.wasm_path())
            .map_err(|err| CircuitError::WitnessGenerator(err.to_string()))?;
        Ok(Self {
            artifacts,
            store,
            calculator,
        })
    }

    /// Generate the full assignment, prove, and check the proof against
    /// the zkey's verifying key before handing it out.
    pub fn prove(&mut self, witness: &SettlementWitness) -> Result<SettlementProof, CircuitError> {
        let assignment = self
            .calculator
            .calculate_witness_element::<Fr, _>(&mut self.store, witness.to_signal_inputs(), false)
            .map_err(|err| CircuitError::Witness(err.to_string()))?;

        let matrices = &self.artifacts.matrices;
        let mut rng = OsRng;
        let r = Fr::rand(&mut rng);
        let s = Fr::rand(&mut rng);
        let proof = Groth16::<Bn254, CircomReduction>::create_proof_with_reduction_and_matrices(
            &self.artifacts.proving_key,
            r,
            s,
            matrices,
            matrices.num_instance_variables,
            matrices.num_constraints,
            assignment.as_slice(),
        )
        .map_err(|err| CircuitError::Proving(err.to_string()))?;

        let public_signals = assignment[1..matrices.num_instance_variables].to_vec();
        let verified = Groth16::<Bn254, CircomReduction>::verify_proof(
            &self.artifacts.prepared_vk,
            &proof,
            &public_signals,
        )
        .map_err(|err| CircuitError::Proving(err.to_string()))?;
        if !verified {
            return Err(CircuitError::Verification);
        }

        let nullifier = *public_signals
            .last()
            .ok_or(CircuitError::MissingNullifier)?;
        Ok(SettlementProof {
            proof_bytes: encode_proof(&proof),
            public_signals_bytes: encode_public_signals(&public_signals),
            public_signals,
            nullifier,
        })
    }
}
