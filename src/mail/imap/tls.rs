//! Transport setup: TCP, optional TLS, and the futures-io compat wrapper async-imap expects.

use std::fmt;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{self, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_util::compat::TokioAsyncReadCompatExt;

use super::MailboxError;
use crate::account::Account;

/// Byte stream an IMAP session runs over.
pub trait ImapStream:
    futures::io::AsyncRead + futures::io::AsyncWrite + Unpin + Send + fmt::Debug
{
}

impl<T> ImapStream for T where
    T: futures::io::AsyncRead + futures::io::AsyncWrite + Unpin + Send + fmt::Debug
{
}

pub type BoxedStream = Box<dyn ImapStream>;

/// Open the socket to the account's server and wrap it in TLS when enabled.
pub async fn open_stream(account: &Account) -> Result<BoxedStream, MailboxError> {
    let addr = account.address();
    let tcp = TcpStream::connect(&addr)
        .await
        .map_err(|e| MailboxError::Transport(format!("connect to {}: {}", addr, e)))?;

    if !account.tls {
        tracing::warn!(account = %account.id, "Using plaintext IMAP connection");
        return Ok(Box::new(tcp.compat()));
    }

    let connector = TlsConnector::from(Arc::new(client_config(account.strict_tls)?));
    let server_name = ServerName::try_from(account.host.clone())
        .map_err(|_| MailboxError::Transport(format!("invalid hostname '{}'", account.host)))?;

    let tls = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| MailboxError::Transport(format!("TLS handshake failed: {}", e)))?;

    Ok(Box::new(tls.compat()))
}

fn client_config(strict: bool) -> Result<ClientConfig, MailboxError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| MailboxError::Transport(format!("TLS setup failed: {}", e)))?;

    let config = if strict {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    } else {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
            .with_no_client_auth()
    };

    Ok(config)
}

/// Certificate verifier for servers with self-signed or mismatched certificates.
#[derive(Debug)]
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}
