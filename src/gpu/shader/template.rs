//! Generation of shaders from templates.

pub mod ambient_occlusion;
pub mod combine;
pub mod light_pass;
pub mod stencil;

use crate::{
    config::FogType,
    gbuffer::{ENVIRONMENT_MAP_INDEX_MASK, RECEIVER_MASK, REFLECTION_MASK, REFRACTION_MASK},
    light::{LightKind, MAX_SHADOW_CASCADES},
};
use anyhow::{Result, anyhow, bail};
use bitflags::bitflags;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::{
    borrow::Cow,
    collections::{BTreeSet, HashSet},
    fmt, mem,
};

bitflags! {
    /// Flags selecting the permutation of a shader template. Each flag
    /// corresponds to a conditional block flag in the templates.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ShaderFlags: u32 {
        const DIRECTIONAL             = 1 << 0;
        const POINT                   = 1 << 1;
        const SPOT                    = 1 << 2;
        const SHADOWED                = 1 << 3;
        const PCF                     = 1 << 4;
        const SSAO                    = 1 << 5;
        const REFLECTION              = 1 << 6;
        const FOG_LINEAR              = 1 << 7;
        const FOG_EXPONENTIAL         = 1 << 8;
        const FOG_SQUARED_EXPONENTIAL = 1 << 9;
        const VERTICAL                = 1 << 10;
    }
}

/// The embedded template sources.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TemplateSource {
    Common,
    LightPass,
    Stencil,
    AmbientOcclusion,
    AmbientOcclusionBlur,
    Combine,
}

/// Identifies a shader permutation: the template it is resolved from and the
/// flags it is resolved with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderPermutationKey {
    pub source: TemplateSource,
    pub flags: ShaderFlags,
}

/// Specific shader template that can be resolved to generate a shader.
pub trait SpecificShaderTemplate: fmt::Debug {
    /// The template source this template is resolved from.
    fn source(&self) -> TemplateSource;

    /// The flags this instance sets when resolving its template.
    fn flags(&self) -> ShaderFlags;

    /// Resolves this instance of the specific shader template into WGSL source
    /// code.
    fn resolve(&self) -> Result<String>;

    /// Returns a label describing this instance of the specific shader
    /// template.
    fn label(&self) -> Cow<'static, str> {
        Cow::Owned(format!("{self:?}"))
    }

    fn permutation_key(&self) -> ShaderPermutationKey {
        ShaderPermutationKey {
            source: self.source(),
            flags: self.flags(),
        }
    }
}

/// A shader template that can be resolved to generate a shader.
///
/// Templates may contain replacement labels, which are identifiers
/// surrounded by double curly braces (`{{<some label>}}`), and conditional
/// blocks. A conditional block starts with a line `#if (<flag>)`, may
/// continue with any number of `#elseif (<flag>)` lines and one `#else`
/// line, and ends with an `#endif` line. Blocks can be nested.
#[derive(Clone, Debug)]
pub struct ShaderTemplate<'a> {
    nodes: Vec<TemplateNode<'a>>,
    flags: HashSet<&'a str>,
    labels: HashSet<&'a str>,
    source_length: usize,
}

#[derive(Clone, Debug)]
enum TemplateNode<'a> {
    Text(&'a str),
    Conditional(Vec<ConditionalBranch<'a>>),
}

#[derive(Clone, Debug)]
struct ConditionalBranch<'a> {
    /// Flag that must be set for the branch to be included, or [`None`] for
    /// an `#else` branch.
    condition: Option<&'a str>,
    body: Vec<TemplateNode<'a>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Directive<'a> {
    If(&'a str),
    ElseIf(&'a str),
    Else,
    EndIf,
}

#[derive(Debug)]
struct OpenBlock<'a> {
    finished: Vec<ConditionalBranch<'a>>,
    current: ConditionalBranch<'a>,
    has_else: bool,
}

lazy_static! {
    static ref REPLACEMENT_LABEL_CAPTURE_REGEX: Regex = Regex::new(r"\{\{(\w+)\}\}").unwrap();
    static ref CONDITIONAL_DIRECTIVE_REGEX: Regex =
        Regex::new(r"^#(if|elseif|else|endif)\s*(?:\(([^)]*)\))?$").unwrap();
    static ref COMMON_TEMPLATE: ShaderTemplate<'static> =
        ShaderTemplate::new(TemplateSource::Common.wgsl_source()).unwrap();
    static ref LIGHT_PASS_TEMPLATE: ShaderTemplate<'static> =
        ShaderTemplate::new(TemplateSource::LightPass.wgsl_source()).unwrap();
    static ref STENCIL_TEMPLATE: ShaderTemplate<'static> =
        ShaderTemplate::new(TemplateSource::Stencil.wgsl_source()).unwrap();
    static ref AMBIENT_OCCLUSION_TEMPLATE: ShaderTemplate<'static> =
        ShaderTemplate::new(TemplateSource::AmbientOcclusion.wgsl_source()).unwrap();
    static ref AMBIENT_OCCLUSION_BLUR_TEMPLATE: ShaderTemplate<'static> =
        ShaderTemplate::new(TemplateSource::AmbientOcclusionBlur.wgsl_source()).unwrap();
    static ref COMBINE_TEMPLATE: ShaderTemplate<'static> =
        ShaderTemplate::new(TemplateSource::Combine.wgsl_source()).unwrap();
}

macro_rules! rendering_template_source {
    ($name:expr) => {{
        include_str!(concat!(
            "../../../shaders/rendering/",
            $name,
            ".template.wgsl"
        ))
    }};
}

impl ShaderFlags {
    const TEMPLATE_FLAG_NAMES: [(Self, &'static str); 11] = [
        (Self::DIRECTIONAL, "directional"),
        (Self::POINT, "point"),
        (Self::SPOT, "spot"),
        (Self::SHADOWED, "shadowed"),
        (Self::PCF, "pcf"),
        (Self::SSAO, "ssao"),
        (Self::REFLECTION, "reflection"),
        (Self::FOG_LINEAR, "fog_linear"),
        (Self::FOG_EXPONENTIAL, "fog_exponential"),
        (Self::FOG_SQUARED_EXPONENTIAL, "fog_squared_exponential"),
        (Self::VERTICAL, "vertical"),
    ];

    pub fn for_light_kind(kind: LightKind) -> Self {
        match kind {
            LightKind::Directional => Self::DIRECTIONAL,
            LightKind::Point => Self::POINT,
            LightKind::Spot => Self::SPOT,
        }
    }

    pub fn for_fog_type(fog_type: FogType) -> Self {
        match fog_type {
            FogType::Disabled => Self::empty(),
            FogType::Linear => Self::FOG_LINEAR,
            FogType::Exponential => Self::FOG_EXPONENTIAL,
            FogType::SquaredExponential => Self::FOG_SQUARED_EXPONENTIAL,
        }
    }

    /// Returns the names of the template flags to set for these flags.
    pub fn template_flag_names(&self) -> Vec<&'static str> {
        Self::TEMPLATE_FLAG_NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl TemplateSource {
    /// Returns the WGSL source code of the template.
    pub const fn wgsl_source(&self) -> &'static str {
        match self {
            Self::Common => rendering_template_source!("common"),
            Self::LightPass => rendering_template_source!("light_pass"),
            Self::Stencil => rendering_template_source!("stencil"),
            Self::AmbientOcclusion => rendering_template_source!("ambient_occlusion"),
            Self::AmbientOcclusionBlur => rendering_template_source!("ambient_occlusion_blur"),
            Self::Combine => rendering_template_source!("combine"),
        }
    }

    /// Returns the parsed [`ShaderTemplate`] for this source.
    pub fn template(&self) -> &'static ShaderTemplate<'static> {
        match self {
            Self::Common => &COMMON_TEMPLATE,
            Self::LightPass => &LIGHT_PASS_TEMPLATE,
            Self::Stencil => &STENCIL_TEMPLATE,
            Self::AmbientOcclusion => &AMBIENT_OCCLUSION_TEMPLATE,
            Self::AmbientOcclusionBlur => &AMBIENT_OCCLUSION_BLUR_TEMPLATE,
            Self::Combine => &COMBINE_TEMPLATE,
        }
    }
}

impl fmt::Display for TemplateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl<'a> ShaderTemplate<'a> {
    /// Creates a new template from the given template source code.
    ///
    /// # Errors
    /// Returns an error if a conditional directive is malformed, uses an
    /// invalid flag name or is not properly nested.
    pub fn new(source_code: &'a str) -> Result<Self> {
        let nodes = parse_nodes(source_code)?;

        let mut flags = HashSet::new();
        collect_flags(&nodes, &mut flags);

        Ok(Self {
            nodes,
            flags,
            labels: find_replacement_labels(source_code),
            source_length: source_code.len(),
        })
    }

    /// Creates and returns a [`HashSet`] containing the replacement labels in
    /// the template.
    pub fn obtain_replacement_label_set(&self) -> HashSet<&'a str> {
        self.labels.clone()
    }

    /// Creates and returns a [`HashSet`] containing the full set of flags used
    /// in the template's conditional blocks.
    pub fn obtain_flags(&self) -> HashSet<&'a str> {
        self.flags.clone()
    }

    /// Resolves the template with the given flags set and with the given
    /// replacements. The set flags select which branch of each conditional
    /// block is included. Each replacement specifies a label in the template
    /// and the string to replace each occurrence of the label with.
    ///
    /// Replacements for labels that only occur in excluded branches are
    /// ignored.
    ///
    /// # Errors
    /// Returns an error if:
    /// - A flag in `flags_to_set` does not exist in the template.
    /// - A label in `replacements` does not exist in the template.
    /// - The same label occurs multiple times in `replacements`.
    /// - A label remaining after resolving the conditional blocks is not
    ///   included in `replacements`.
    pub fn resolve(&self, flags_to_set: &[&str], replacements: &[(&str, String)]) -> Result<String> {
        for flag in flags_to_set {
            if !self.flags.contains(flag) {
                bail!(
                    "Flag `{}` is not present in the template (present flags: {})",
                    flag,
                    sorted_list(self.flags.iter().copied())
                );
            }
        }

        for (idx, (label, _)) in replacements.iter().enumerate() {
            if !self.labels.contains(label) {
                bail!("No label `{}` to replace in template", label);
            }
            if replacements[idx + 1..]
                .iter()
                .any(|(other_label, _)| other_label == label)
            {
                bail!("Duplicate label `{}` in replacements", label);
            }
        }

        let mut resolved_source_code = String::with_capacity(self.source_length);
        resolve_nodes(&self.nodes, flags_to_set, &mut resolved_source_code);

        let missing_labels: BTreeSet<&str> = find_replacement_labels(&resolved_source_code)
            .into_iter()
            .filter(|label| !replacements.iter().any(|(replaced, _)| replaced == label))
            .collect();

        if !missing_labels.is_empty() {
            bail!(
                "Not all labels replaced in template (missing labels: {})",
                sorted_list(missing_labels.into_iter())
            );
        }

        let replaced = REPLACEMENT_LABEL_CAPTURE_REGEX
            .replace_all(&resolved_source_code, |captures: &Captures<'_>| {
                let label = &captures[1];
                replacements
                    .iter()
                    .find(|(replaced, _)| *replaced == label)
                    .map_or_else(String::new, |(_, replacement)| replacement.clone())
            })
            .into_owned();

        Ok(replaced)
    }
}

impl<'a> OpenBlock<'a> {
    fn new(flag: &'a str) -> Self {
        Self {
            finished: Vec::new(),
            current: ConditionalBranch {
                condition: Some(flag),
                body: Vec::new(),
            },
            has_else: false,
        }
    }

    fn start_branch(&mut self, condition: Option<&'a str>) {
        let previous = mem::replace(
            &mut self.current,
            ConditionalBranch {
                condition,
                body: Vec::new(),
            },
        );
        self.finished.push(previous);
    }

    fn close(mut self) -> TemplateNode<'a> {
        self.finished.push(self.current);
        TemplateNode::Conditional(self.finished)
    }
}

/// Resolves the common template snippet that all other templates include
/// through their `common` label.
pub fn resolve_common_source() -> Result<String> {
    TemplateSource::Common.template().resolve(
        &[],
        shader_template_replacements!(
            "max_shadow_cascades" => MAX_SHADOW_CASCADES,
            "receiver_mask" => RECEIVER_MASK,
            "refraction_mask" => REFRACTION_MASK,
            "reflection_mask" => REFLECTION_MASK,
            "environment_map_index_mask" => ENVIRONMENT_MAP_INDEX_MASK,
        ),
    )
}

/// Formats a float as a WGSL literal.
pub fn wgsl_float(value: f32) -> String {
    format!("{value:?}")
}

fn parse_nodes(source_code: &str) -> Result<Vec<TemplateNode<'_>>> {
    let mut root = Vec::new();
    let mut open_blocks: Vec<OpenBlock<'_>> = Vec::new();

    for (line_idx, line) in source_code.split_inclusive('\n').enumerate() {
        let line_number = line_idx + 1;

        match parse_directive(line)? {
            None => {
                let body = match open_blocks.last_mut() {
                    Some(block) => &mut block.current.body,
                    None => &mut root,
                };
                body.push(TemplateNode::Text(line));
            }
            Some(Directive::If(flag)) => {
                open_blocks.push(OpenBlock::new(flag));
            }
            Some(Directive::ElseIf(flag)) => {
                let block = open_blocks.last_mut().ok_or_else(|| {
                    anyhow!("Unexpected `#elseif` outside conditional block on line {line_number}")
                })?;
                if block.has_else {
                    bail!("Unexpected `#elseif` after `#else` on line {line_number}");
                }
                block.start_branch(Some(flag));
            }
            Some(Directive::Else) => {
                let block = open_blocks.last_mut().ok_or_else(|| {
                    anyhow!("Unexpected `#else` outside conditional block on line {line_number}")
                })?;
                if block.has_else {
                    bail!("Duplicate `#else` on line {line_number}");
                }
                block.has_else = true;
                block.start_branch(None);
            }
            Some(Directive::EndIf) => {
                let block = open_blocks.pop().ok_or_else(|| {
                    anyhow!("Unexpected `#endif` outside conditional block on line {line_number}")
                })?;
                let node = block.close();
                match open_blocks.last_mut() {
                    Some(parent) => parent.current.body.push(node),
                    None => root.push(node),
                }
            }
        }
    }

    if !open_blocks.is_empty() {
        bail!(
            "Missing `#endif` for {} conditional block(s) in template",
            open_blocks.len()
        );
    }

    Ok(root)
}

fn parse_directive(line: &str) -> Result<Option<Directive<'_>>> {
    let trimmed = line.trim();
    if !trimmed.starts_with('#') {
        return Ok(None);
    }

    let captures = CONDITIONAL_DIRECTIVE_REGEX
        .captures(trimmed)
        .ok_or_else(|| anyhow!("Invalid conditional directive in template: {}", trimmed))?;

    let condition = captures.get(2).map(|condition| condition.as_str().trim());

    let directive = match (&captures[1], condition) {
        ("if", Some(flag)) => Directive::If(validated_flag(flag)?),
        ("elseif", Some(flag)) => Directive::ElseIf(validated_flag(flag)?),
        ("else", None) => Directive::Else,
        ("endif", None) => Directive::EndIf,
        _ => bail!("Invalid conditional directive in template: {}", trimmed),
    };
    Ok(Some(directive))
}

fn validated_flag(name: &str) -> Result<&str> {
    if !is_valid_identifier(name) {
        bail!(
            "Invalid flag name (only alphanumeric characters and underscores are allowed): {}",
            name
        );
    }
    Ok(name)
}

fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

fn collect_flags<'a>(nodes: &[TemplateNode<'a>], flags: &mut HashSet<&'a str>) {
    for node in nodes {
        if let TemplateNode::Conditional(branches) = node {
            for branch in branches {
                if let Some(flag) = branch.condition {
                    flags.insert(flag);
                }
                collect_flags(&branch.body, flags);
            }
        }
    }
}

fn resolve_nodes(nodes: &[TemplateNode<'_>], flags_to_set: &[&str], resolved: &mut String) {
    for node in nodes {
        match node {
            TemplateNode::Text(text) => resolved.push_str(text),
            TemplateNode::Conditional(branches) => {
                if let Some(branch) = branches.iter().find(|branch| {
                    branch
                        .condition
                        .is_none_or(|flag| flags_to_set.contains(&flag))
                }) {
                    resolve_nodes(&branch.body, flags_to_set, resolved);
                }
            }
        }
    }
}

fn find_replacement_labels(source_code: &str) -> HashSet<&str> {
    let mut labels = HashSet::new();
    for captures in REPLACEMENT_LABEL_CAPTURE_REGEX.captures_iter(source_code) {
        if let Some(label) = captures.get(1) {
            labels.insert(label.as_str());
        }
    }
    labels
}

fn sorted_list<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.collect::<BTreeSet<_>>().into_iter().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
pub fn validate_template(template: &impl SpecificShaderTemplate) {
    let source = template.resolve().expect("Resolving template failed");
    let module = match naga::front::wgsl::parse_str(&source) {
        Ok(module) => module,
        Err(err) => {
            println!("{}\n", &source);
            eprintln!("{}", err.emit_to_string(&source));
            panic!("Parsing resolved template failed");
        }
    };
    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    if let Err(err) = validator.validate(&module) {
        println!("{}\n", &source);
        eprintln!("{}", err.emit_to_string(&source));
        panic!("Shader validation failed");
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn should_find_no_labels_or_flags_for_empty_template() {
        let template = ShaderTemplate::new("").unwrap();
        assert!(template.obtain_replacement_label_set().is_empty());
        assert!(template.obtain_flags().is_empty());
    }

    #[test]
    fn should_find_correct_label_for_template_with_only_same_label_twice() {
        let template = ShaderTemplate::new("{{test}}{{test}}").unwrap();
        let labels = template.obtain_replacement_label_set();
        assert_eq!(labels.len(), 1);
        assert!(labels.contains("test"));
    }

    #[test]
    fn should_find_correct_label_for_template_with_label_and_other_stuff() {
        let template = ShaderTemplate::new("{{{test}}test}_").unwrap();
        let labels = template.obtain_replacement_label_set();
        assert_eq!(labels.len(), 1);
        assert!(labels.contains("test"));
    }

    #[test]
    fn should_give_empty_string_when_resolving_empty_template() {
        let template = ShaderTemplate::new("").unwrap();
        assert!(template.resolve(&[], &[]).unwrap().is_empty());
    }

    #[test]
    fn should_fail_to_resolve_empty_template_with_replacement() {
        let template = ShaderTemplate::new("").unwrap();
        assert!(template.resolve(&[], &[("label", "actual".to_string())]).is_err());
    }

    #[test]
    fn should_fail_to_resolve_with_duplicate_replacement() {
        let template = ShaderTemplate::new("{{label}}").unwrap();
        let result = template.resolve(
            &[],
            &[
                ("label", "actual1".to_string()),
                ("label", "actual2".to_string()),
            ],
        );
        assert!(result.is_err());
    }

    #[test]
    fn should_fail_to_resolve_with_too_few_replacements() {
        let template = ShaderTemplate::new("{{label}}").unwrap();
        assert!(template.resolve(&[], &[]).is_err());
    }

    #[test]
    fn should_resolve_template_with_two_labels_and_other_stuff() {
        let template = ShaderTemplate::new("{{{label1}}label1{{label2}}_").unwrap();
        let resolved = template
            .resolve(
                &[],
                &[
                    ("label1", "actual1".to_string()),
                    ("label2", "actual2".to_string()),
                ],
            )
            .unwrap();
        assert_eq!(&resolved, "{actual1label1actual2_");
    }

    #[test]
    fn should_not_expand_dollar_signs_in_replacements() {
        let template = ShaderTemplate::new("{{label}}").unwrap();
        let resolved = template.resolve(&[], &[("label", "$1".to_string())]).unwrap();
        assert_eq!(&resolved, "$1");
    }

    #[test]
    fn should_find_flags_of_all_branches() {
        let template =
            ShaderTemplate::new("#if (flag1)\na\n#elseif (flag2)\nb\n#else\nc\n#endif\n").unwrap();
        let flags = template.obtain_flags();
        assert_eq!(flags.len(), 2);
        assert!(flags.contains("flag1"));
        assert!(flags.contains("flag2"));
    }

    #[test]
    fn should_include_first_branch_with_set_flag() {
        let template = ShaderTemplate::new(
            "start\n#if (flag1)\na\n#elseif (flag2)\nb\n#elseif (flag3)\nc\n#else\nd\n#endif\nend\n",
        )
        .unwrap();
        assert_eq!(template.resolve(&["flag1"], &[]).unwrap(), "start\na\nend\n");
        assert_eq!(template.resolve(&["flag2"], &[]).unwrap(), "start\nb\nend\n");
        assert_eq!(
            template.resolve(&["flag3", "flag2"], &[]).unwrap(),
            "start\nb\nend\n"
        );
        assert_eq!(template.resolve(&["flag3"], &[]).unwrap(), "start\nc\nend\n");
        assert_eq!(template.resolve(&[], &[]).unwrap(), "start\nd\nend\n");
    }

    #[test]
    fn should_resolve_nested_conditional_blocks() {
        let template = ShaderTemplate::new(
            "#if (outer)\n  #if(inner)\nboth\n  #else\nouter\n  #endif\n#else\nnone\n#endif\n",
        )
        .unwrap();
        assert_eq!(template.resolve(&["outer", "inner"], &[]).unwrap(), "both\n");
        assert_eq!(template.resolve(&["outer"], &[]).unwrap(), "outer\n");
        assert_eq!(template.resolve(&["inner"], &[]).unwrap(), "none\n");
    }

    #[test]
    fn should_ignore_replacements_for_labels_in_excluded_branches() {
        let template = ShaderTemplate::new("#if (flag)\n{{label}}\n#endif\n{{other}}").unwrap();
        let resolved = template
            .resolve(
                &[],
                &[
                    ("label", "gone".to_string()),
                    ("other", "kept".to_string()),
                ],
            )
            .unwrap();
        assert_eq!(&resolved, "kept");
    }

    #[test]
    fn should_require_replacements_for_labels_in_included_branches() {
        let template = ShaderTemplate::new("#if (flag)\n{{label}}\n#endif\n").unwrap();
        assert!(template.resolve(&[], &[]).is_ok());
        assert!(template.resolve(&["flag"], &[]).is_err());
    }

    #[test]
    fn should_fail_to_resolve_with_unknown_flag() {
        let template = ShaderTemplate::new("#if (flag)\n#endif\n").unwrap();
        assert!(template.resolve(&["other"], &[]).is_err());
    }

    #[test]
    fn should_fail_to_create_template_with_malformed_blocks() {
        for source in [
            "#if (flag)\n",
            "#endif\n",
            "#else\n",
            "#elseif (flag)\n#endif\n",
            "#if (flag)\n#else\n#else\n#endif\n",
            "#if (flag)\n#else\n#elseif (other)\n#endif\n",
            "#if\n#endif\n",
            "#if ()\n#endif\n",
            "#if (fl-ag)\n#endif\n",
            "#if (flag?)\n#endif\n",
            "#else (flag)\n",
            "#ifdef flag\n",
        ] {
            assert!(ShaderTemplate::new(source).is_err(), "{source}");
        }
    }

    #[test]
    fn should_map_shader_flags_to_template_flag_names() {
        let flags = ShaderFlags::POINT | ShaderFlags::SHADOWED | ShaderFlags::PCF;
        assert_eq!(flags.template_flag_names(), vec!["point", "shadowed", "pcf"]);
        assert!(ShaderFlags::empty().template_flag_names().is_empty());
        assert_eq!(ShaderFlags::for_fog_type(FogType::Disabled), ShaderFlags::empty());
    }

    #[test]
    fn should_parse_all_embedded_templates() {
        for source in [
            TemplateSource::Common,
            TemplateSource::LightPass,
            TemplateSource::Stencil,
            TemplateSource::AmbientOcclusion,
            TemplateSource::AmbientOcclusionBlur,
            TemplateSource::Combine,
        ] {
            assert!(ShaderTemplate::new(source.wgsl_source()).is_ok(), "{source}");
        }
        assert!(resolve_common_source().is_ok());
    }

    #[test]
    fn should_format_floats_as_wgsl_literals() {
        assert_eq!(wgsl_float(1.0), "1.0");
        assert_eq!(wgsl_float(0.005), "0.005");
        assert_eq!(wgsl_float(-2.5), "-2.5");
    }
}
