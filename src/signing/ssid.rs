use magikitten::Transcript;

use super::Parameters;
use crate::{
    compat::{point_bytes, CURVE_NAME},
    keyshare::SaveData,
    protocol::Participant,
};

const SSID_LABEL: &[u8] = b"gg20-sign v0.1.0 signing";

pub(crate) const MTA_ALICE_LABEL: &[u8] = b"mta alice range";
pub(crate) const MTA_BOB_LABEL: &[u8] = b"mta bob";
pub(crate) const MTA_BOB_WC_LABEL: &[u8] = b"mta bob wc";
pub(crate) const TPROOF_LABEL: &[u8] = b"tproof";
pub(crate) const GAMMA_DLOG_LABEL: &[u8] = b"gamma dlog";
pub(crate) const PDL_LABEL: &[u8] = b"pdl";
pub(crate) const STPROOF_LABEL: &[u8] = b"stproof";

/// The identity of a signing session.
///
/// This binds every proof made during the session to the signers, their keys,
/// and a nonce, so that proofs can't be replayed across sessions.
pub struct SessionId(Transcript);

impl SessionId {
    pub fn new(params: &Parameters, key: &SaveData) -> Self {
        let mut transcript = Transcript::new(SSID_LABEL);
        transcript.message(b"curve", CURVE_NAME);
        for (j, party) in params.parties().ids().iter().enumerate() {
            transcript.message(b"party key", &party.key_bytes());
            transcript.message(b"public share", &point_bytes(&key.big_xj[j]));
            transcript.message(b"paillier n", &key.paillier_pks[j].n().to_bytes());
            let [n_tilde, h1, h2] = key.pedersen[j].to_bytes();
            transcript.message(b"n tilde", &n_tilde);
            transcript.message(b"h1", &h1);
            transcript.message(b"h2", &h2);
        }
        transcript.message(b"public key", &point_bytes(&key.public_key));
        transcript.message(b"nonce", params.nonce());
        Self(transcript)
    }

    /// A transcript for one proof, made by `prover` for `verifier`.
    ///
    /// Proofs checked by everyone have no particular verifier.
    pub fn fork(
        &self,
        label: &'static [u8],
        prover: Participant,
        verifier: Option<Participant>,
    ) -> Transcript {
        let mut transcript = self.0.forked(label, &prover.bytes());
        if let Some(verifier) = verifier {
            transcript.message(b"verifier", &verifier.bytes());
        }
        transcript
    }
}
