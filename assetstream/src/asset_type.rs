//! Asset type names and their datagram wire codes.
//!
//! Consumers and the HTTP/RPC transports identify types by name. The legacy
//! datagram transport only understands a fixed set of numeric codes, so a
//! request for a type outside this table cannot be served over it.

/// Type name used for textures. Textures travel over the image channel
/// of the datagram transport instead of the generic transfer channel.
pub const TEXTURE: &str = "Texture";

/// Type name used for meshes.
pub const MESH: &str = "Mesh";

/// Type name used for avatar appearance descriptors.
pub const AVATAR_XML: &str = "GenericAvatarXml";

/// Known (name, wire code) pairs.
const ASSET_TYPES: &[(&str, i32)] = &[
    (TEXTURE, 0),
    ("Sound", 1),
    ("CallingCard", 2),
    ("Landmark", 3),
    ("Clothing", 5),
    ("Object", 6),
    ("Notecard", 7),
    ("LSLText", 10),
    ("LSLBytecode", 11),
    ("Bodypart", 13),
    ("Animation", 20),
    ("Gesture", 21),
    ("ParticleScript", 41),
    (MESH, 43),
    ("Skeleton", 44),
    ("MaterialScript", 45),
    (AVATAR_XML, 46),
    ("FlashAnimation", 49),
];

/// Look up the wire code for a type name.
///
/// Returns `None` for names the datagram transport does not know.
pub fn code_from_name(name: &str) -> Option<i32> {
    ASSET_TYPES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, code)| *code)
}

/// Look up the type name for a wire code.
pub fn name_from_code(code: i32) -> Option<&'static str> {
    ASSET_TYPES
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(name, _)| *name)
}

/// Whether the type is served by an HTTP texture capability.
pub fn is_capability_type(name: &str) -> bool {
    name == TEXTURE || name == MESH
}
