use oci_client::manifest::{OciDescriptor, OciImageManifest};

/// Media type of the layer holding the packaged chart.
pub const HELM_CHART_CONTENT_MEDIA_TYPE: &str =
    "application/vnd.cncf.helm.chart.content.v1.tar+gzip";

/// Manifest media types accepted when pulling a chart.
pub const ACCEPTED_MANIFEST_MEDIA_TYPES: &[&str] = &["application/vnd.oci.image.manifest.v1+json"];

/// The first layer carrying chart content, if any.
pub fn chart_layer(manifest: &OciImageManifest) -> Option<&OciDescriptor> {
    manifest
        .layers
        .iter()
        .find(|layer| layer.media_type == HELM_CHART_CONTENT_MEDIA_TYPE)
}
