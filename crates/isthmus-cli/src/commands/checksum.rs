//! Checksum command - contract token for an operation signature

use anyhow::{Context, Result};
use isthmus_runtime::ffi::{OperationSignature, WireShape};

/// Signature pieces as given on the command line
#[derive(Debug, Clone)]
pub struct ChecksumArgs {
    pub name: String,
    pub params: Vec<String>,
    pub returns: Option<String>,
    pub throws: Option<String>,
}

/// Print the signature's canonical text and checksum.
pub fn run(args: ChecksumArgs) -> Result<()> {
    let signature = signature(&args)?;
    println!("{}", render(&signature));
    Ok(())
}

pub fn signature(args: &ChecksumArgs) -> Result<OperationSignature> {
    let mut signature = OperationSignature::new(&args.name);
    for param in &args.params {
        signature = signature.param(parse_shape("parameter", param)?);
    }
    if let Some(returns) = &args.returns {
        signature = signature.returns(parse_shape("return", returns)?);
    }
    if let Some(throws) = &args.throws {
        signature = signature.throws(parse_shape("error", throws)?);
    }
    Ok(signature)
}

fn parse_shape(role: &str, text: &str) -> Result<WireShape> {
    text.parse()
        .with_context(|| format!("Invalid {} shape '{}'", role, text))
}

/// `canonical-text = decimal (0xhex)`
pub fn render(signature: &OperationSignature) -> String {
    let checksum = signature.checksum();
    format!("{} = {} (0x{:04x})", signature, checksum, checksum)
}
