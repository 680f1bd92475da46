mod common;

use common::{context, der, sequence, TestSigner};
use simple_asn1::{oid, ASN1Block};
use zipverifierust::{pkcs7::Pkcs7Verifier, SignatureError, SignatureVerifier};

const SF: &[u8] = b"Signature-Version: 1.0\r\nSHA-256-Digest-Manifest: AAAA\r\n\r\n";

#[test]
fn verifies_block_with_authenticated_attributes() {
    let signer = TestSigner::new("Block Signer");
    let block = signer.sign(SF);

    let chain = Pkcs7Verifier::new().verify(SF, &block).unwrap();
    assert_eq!(chain.len(), 1);
    let cert = chain.signer().unwrap();
    assert!(cert.subject().contains("Block Signer"), "{}", cert.subject());
    assert_eq!(cert.der(), signer.cert_der.as_slice());
}

#[test]
fn rejects_signature_file_changed_after_signing() {
    let signer = TestSigner::new("Signer");
    let block = signer.sign(SF);
    let mut tampered = SF.to_vec();
    tampered[0] = b's';

    let err = Pkcs7Verifier::new().verify(&tampered, &block).unwrap_err();
    assert!(matches!(err, SignatureError::BadSignature), "{:?}", err);
}

#[test]
fn verifies_block_signing_the_file_directly() {
    let signer = TestSigner::new("Direct");
    let block = signer.sign_with(SF, false, &signer.cert_der);
    let verifier = Pkcs7Verifier::new();

    assert!(verifier.verify(SF, &block).is_ok());
    let err = verifier.verify(b"Signature-Version: 1.0\r\n\r\n", &block).unwrap_err();
    assert!(matches!(err, SignatureError::BadSignature), "{:?}", err);
}

#[test]
fn embedded_certificate_must_match_signer_info() {
    let signer = TestSigner::new("Real Signer");
    let other = TestSigner::new("Someone Else");
    let block = signer.sign_with(SF, true, &other.cert_der);

    let err = Pkcs7Verifier::new().verify(SF, &block).unwrap_err();
    assert!(matches!(err, SignatureError::SignerNotFound), "{:?}", err);
}

#[test]
fn rejects_malformed_blocks() {
    let verifier = Pkcs7Verifier::new();
    assert!(verifier.verify(SF, b"").is_err());
    assert!(verifier.verify(SF, b"not a pkcs7 block").is_err());
    // Well-formed DER but not SignedData.
    let not_signed_data = der(&sequence(vec![
        ASN1Block::ObjectIdentifier(0, oid!(1, 2, 3)),
        context(0, der(&sequence(vec![]))),
    ]));
    assert!(verifier.verify(SF, &not_signed_data).is_err());
}

#[test]
fn signer_is_found_among_several_embedded_certificates() {
    let signer = TestSigner::new("Leaf");
    let other = TestSigner::new("Intermediate");
    let embedded = [other.cert_der.as_slice(), signer.cert_der.as_slice()].concat();
    let block = signer.sign_with(SF, true, &embedded);

    let chain = Pkcs7Verifier::new().verify(SF, &block).unwrap();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain.signer().unwrap().der(), signer.cert_der.as_slice());
    assert_eq!(chain.certificates()[1].der(), other.cert_der.as_slice());
}
