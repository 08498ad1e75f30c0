//! Built-in design-system components (`NavDS`)
//!
//! Each component is a native function component that expands to host
//! elements carrying the library's `navds-*` class names. Props a component
//! does not consume (event handlers, `id`, `aria-*`, `data-*` ...) are
//! forwarded to its outermost host element.

use crate::exception::ScriptResult;
use crate::interpreter::Interpreter;
use crate::value::{format_number, ElementKind, Function, Object, Value};

type Render = fn(&mut Interpreter, &Props) -> ScriptResult<Value>;

/// Snapshot of the props object a component was called with
pub struct Props {
    object: Object,
}

impl Props {
    fn from_args(args: &[Value]) -> Self {
        let object = match args.first() {
            Some(Value::Object(object)) => Object::with_props(object.lock().entries().to_vec()),
            _ => Object::new(),
        };
        Self { object }
    }

    fn get(&self, name: &str) -> Value {
        self.object.get(name).unwrap_or(Value::Undefined)
    }

    fn string(&self, name: &str) -> Option<String> {
        match self.object.get(name)? {
            Value::Undefined | Value::Null => None,
            value => Some(value.to_js_string()),
        }
    }

    fn string_or(&self, name: &str, default: &str) -> String {
        self.string(name).unwrap_or_else(|| default.to_string())
    }

    fn flag(&self, name: &str) -> bool {
        self.get(name).is_truthy()
    }

    fn children(&self) -> Value {
        self.get("children")
    }
}

/// Host element under construction
struct Host {
    tag: String,
    classes: Vec<String>,
    style: Vec<(String, Value)>,
    props: Object,
}

impl Host {
    fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            classes: Vec::new(),
            style: Vec::new(),
            props: Object::new(),
        }
    }

    fn class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    fn class_if(self, condition: bool, class: impl Into<String>) -> Self {
        if condition {
            self.class(class)
        } else {
            self
        }
    }

    fn style(mut self, name: &str, value: Option<String>) -> Self {
        if let Some(value) = value {
            self.style.push((name.to_string(), Value::String(value)));
        }
        self
    }

    fn attr(mut self, name: &str, value: Value) -> Self {
        if !value.is_nullish() {
            self.props.set(name, value);
        }
        self
    }

    /// Forward every prop except `consumed`, merging `className` and `style`
    fn forward(mut self, props: &Props, consumed: &[&str]) -> Self {
        for (name, value) in props.object.entries() {
            if name == "children" || consumed.contains(&name.as_str()) {
                continue;
            }
            match name.as_str() {
                "className" => {
                    if let Some(class) = props.string("className") {
                        self.classes.push(class);
                    }
                }
                "style" => {
                    if let Value::Object(style) = value {
                        self.style.extend(style.lock().entries().iter().cloned());
                    }
                }
                _ => {
                    self.props.set(name.clone(), value.clone());
                }
            }
        }
        self
    }

    fn build(self, interp: &mut Interpreter, children: Vec<Value>) -> Value {
        let mut props = self.props;
        if !self.classes.is_empty() {
            props.set("className", Value::String(self.classes.join(" ")));
        }
        if !self.style.is_empty() {
            let style = interp.alloc_object(Object::with_props(self.style));
            props.set("style", style);
        }
        let children: Vec<Value> = children.into_iter().filter(|c| !c.is_nullish()).collect();
        interp.attach_children(&mut props, children);
        interp.alloc_element(ElementKind::Host(self.tag), props, None)
    }
}

/// Spacing token (`"4"`, `"space-16"`) to a CSS length
fn spacing(token: &str) -> String {
    token
        .split_whitespace()
        .map(|part| match part.strip_prefix("space-") {
            Some(px) => format!("var(--a-spacing-{})", px_to_step(px)),
            None if part.chars().all(|c| c.is_ascii_digit() || c == '-') => format!("var(--a-spacing-{})", part),
            None => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn px_to_step(px: &str) -> String {
    match px.parse::<f64>() {
        Ok(px) => format_number(px / 4.0),
        Err(_) => px.to_string(),
    }
}

fn size_class(base: &str, props: &Props, default: &str) -> String {
    format!("{}--{}", base, props.string_or("size", default))
}

// ---- typography ----

fn heading(interp: &mut Interpreter, props: &Props) -> ScriptResult<Value> {
    let level = props.string_or("level", "2");
    let tag = props.string("as").unwrap_or_else(|| format!("h{}", level));
    Ok(Host::new(tag)
        .class("navds-heading")
        .class(size_class("navds-heading", props, "medium"))
        .class_if(props.flag("spacing"), "navds-heading--spacing")
        .forward(props, &["level", "size", "spacing", "as"])
        .build(interp, vec![props.children()]))
}

fn body_long(interp: &mut Interpreter, props: &Props) -> ScriptResult<Value> {
    Ok(Host::new(props.string_or("as", "p"))
        .class("navds-body-long")
        .class(size_class("navds-body-long", props, "medium"))
        .class_if(props.flag("spacing"), "navds-typo--spacing")
        .forward(props, &["size", "spacing", "as", "weight"])
        .build(interp, vec![props.children()]))
}

fn body_short(interp: &mut Interpreter, props: &Props) -> ScriptResult<Value> {
    Ok(Host::new(props.string_or("as", "p"))
        .class("navds-body-short")
        .class(size_class("navds-body-short", props, "medium"))
        .class_if(props.flag("spacing"), "navds-typo--spacing")
        .forward(props, &["size", "spacing", "as", "weight"])
        .build(interp, vec![props.children()]))
}

fn detail(interp: &mut Interpreter, props: &Props) -> ScriptResult<Value> {
    Ok(Host::new(props.string_or("as", "p"))
        .class("navds-detail")
        .class_if(props.string("size").as_deref() == Some("small"), "navds-detail--small")
        .forward(props, &["size", "spacing", "as", "weight"])
        .build(interp, vec![props.children()]))
}

fn label(interp: &mut Interpreter, props: &Props) -> ScriptResult<Value> {
    Ok(Host::new(props.string_or("as", "label"))
        .class("navds-label")
        .class_if(props.string("size").as_deref() == Some("small"), "navds-label--small")
        .forward(props, &["size", "spacing", "as"])
        .build(interp, vec![props.children()]))
}

// ---- layout ----

fn layout_box(interp: &mut Interpreter, props: &Props) -> ScriptResult<Value> {
    let background = props.string("background").map(|token| format!("var(--a-{})", token));
    let radius = props
        .string("borderRadius")
        .map(|token| format!("var(--a-border-radius-{})", token));
    Ok(Host::new(props.string_or("as", "div"))
        .class("navds-box")
        .style("padding", props.string("padding").map(|t| spacing(&t)))
        .style("paddingInline", props.string("paddingInline").map(|t| spacing(&t)))
        .style("paddingBlock", props.string("paddingBlock").map(|t| spacing(&t)))
        .style("background", background)
        .style("borderRadius", radius)
        .forward(
            props,
            &["as", "padding", "paddingInline", "paddingBlock", "background", "borderRadius", "borderColor", "borderWidth", "shadow"],
        )
        .build(interp, vec![props.children()]))
}

fn stack(interp: &mut Interpreter, props: &Props, direction: &str) -> ScriptResult<Value> {
    let align = props.string("align");
    let justify = props.string("justify");
    Ok(Host::new(props.string_or("as", "div"))
        .class("navds-stack")
        .class(format!("navds-{}", direction))
        .class_if(props.flag("wrap"), "navds-stack--wrap")
        .style("gap", props.string("gap").map(|t| spacing(&t)))
        .style("alignItems", align)
        .style("justifyContent", justify)
        .forward(props, &["as", "gap", "align", "justify", "wrap"])
        .build(interp, vec![props.children()]))
}

fn vstack(interp: &mut Interpreter, props: &Props) -> ScriptResult<Value> {
    stack(interp, props, "vstack")
}

fn hstack(interp: &mut Interpreter, props: &Props) -> ScriptResult<Value> {
    stack(interp, props, "hstack")
}

fn hgrid(interp: &mut Interpreter, props: &Props) -> ScriptResult<Value> {
    let columns = match props.get("columns") {
        Value::Number(n) => Some(format!("repeat({}, minmax(0, 1fr))", format_number(n))),
        Value::Undefined | Value::Null => None,
        other => Some(other.to_js_string()),
    };
    Ok(Host::new("div")
        .class("navds-hgrid")
        .style("gridTemplateColumns", columns)
        .style("gap", props.string("gap").map(|t| spacing(&t)))
        .forward(props, &["columns", "gap", "align"])
        .build(interp, vec![props.children()]))
}

fn spacer(interp: &mut Interpreter, props: &Props) -> ScriptResult<Value> {
    Ok(Host::new("span")
        .class("navds-stack__spacer")
        .forward(props, &[])
        .build(interp, Vec::new()))
}

fn panel(interp: &mut Interpreter, props: &Props) -> ScriptResult<Value> {
    Ok(Host::new(props.string_or("as", "div"))
        .class("navds-panel")
        .class_if(props.flag("border"), "navds-panel--border")
        .forward(props, &["as", "border"])
        .build(interp, vec![props.children()]))
}

// ---- feedback ----

fn alert(interp: &mut Interpreter, props: &Props) -> ScriptResult<Value> {
    let size = props.string_or("size", "medium");
    let variant = props.string_or("variant", "info");
    let wrapper = Host::new("div")
        .class("navds-alert__wrapper")
        .class("navds-body-long")
        .class(format!("navds-body-long--{}", size))
        .build(interp, vec![props.children()]);
    let role = if variant == "error" || variant == "warning" {
        "alert"
    } else {
        "status"
    };
    Ok(Host::new("div")
        .class("navds-alert")
        .class(format!("navds-alert--{}", variant))
        .class(format!("navds-alert--{}", size))
        .class_if(props.flag("fullWidth"), "navds-alert--full-width")
        .class_if(props.flag("inline"), "navds-alert--inline")
        .attr("role", Value::string(role))
        .forward(props, &["variant", "size", "fullWidth", "inline", "closeButton", "onClose"])
        .build(interp, vec![wrapper]))
}

fn loader(interp: &mut Interpreter, props: &Props) -> ScriptResult<Value> {
    Ok(Host::new("span")
        .class("navds-loader")
        .class(size_class("navds-loader", props, "medium"))
        .attr("role", Value::string("img"))
        .attr("aria-label", Value::String(props.string_or("title", "venter...")))
        .forward(props, &["size", "title", "variant", "transparent"])
        .build(interp, Vec::new()))
}

fn tag(interp: &mut Interpreter, props: &Props) -> ScriptResult<Value> {
    Ok(Host::new("span")
        .class("navds-tag")
        .class(format!("navds-tag--{}", props.string_or("variant", "neutral")))
        .class(size_class("navds-tag", props, "medium"))
        .class("navds-body-short")
        .forward(props, &["variant", "size", "icon"])
        .build(interp, vec![props.children()]))
}

// ---- actions ----

fn button(interp: &mut Interpreter, props: &Props) -> ScriptResult<Value> {
    let loading = props.flag("loading");
    let content = if loading {
        let spinner = loader(interp, &Props { object: Object::new() })?;
        vec![spinner]
    } else {
        let label = Host::new("span").class("navds-label").build(interp, vec![props.children()]);
        vec![props.get("icon"), label]
    };
    Ok(Host::new(props.string_or("as", "button"))
        .class("navds-button")
        .class(format!("navds-button--{}", props.string_or("variant", "primary")))
        .class(size_class("navds-button", props, "medium"))
        .class_if(loading, "navds-button--loading")
        .class_if(props.flag("disabled") || loading, "navds-button--disabled")
        .attr("type", Value::String(props.string_or("type", "button")))
        .attr("disabled", Value::Bool(props.flag("disabled") || loading))
        .forward(props, &["variant", "size", "loading", "icon", "iconPosition", "as", "type", "disabled"])
        .build(interp, content))
}

fn link(interp: &mut Interpreter, props: &Props) -> ScriptResult<Value> {
    Ok(Host::new(props.string_or("as", "a"))
        .class("navds-link")
        .class_if(props.flag("inlineText"), "navds-link--inline-text")
        .forward(props, &["as", "inlineText", "variant"])
        .build(interp, vec![props.children()]))
}

// ---- form ----

/// Label, description, control and error message wrapped in a form field
fn form_field(
    interp: &mut Interpreter,
    props: &Props,
    field_class: &str,
    control: Value,
) -> Value {
    let size = props.string_or("size", "medium");
    let label = props.string("label").map(|text| {
        Host::new("label")
            .class("navds-form-field__label")
            .class("navds-label")
            .attr("htmlFor", props.get("id"))
            .build(interp, vec![Value::String(text)])
    });
    let description = props.string("description").map(|text| {
        Host::new("div")
            .class("navds-form-field__description")
            .class("navds-body-short")
            .build(interp, vec![Value::String(text)])
    });
    let error = props.string("error").map(|text| {
        let message = Host::new("p")
            .class("navds-error-message")
            .class("navds-label")
            .build(interp, vec![Value::String(text)]);
        Host::new("div")
            .class("navds-form-field__error")
            .attr("role", Value::string("alert"))
            .build(interp, vec![message])
    });
    let has_error = error.is_some();
    Host::new("div")
        .class("navds-form-field")
        .class(format!("navds-form-field--{}", size))
        .class(field_class)
        .class_if(has_error, format!("{}--error", field_class))
        .class_if(props.flag("disabled"), "navds-form-field--disabled")
        .build(
            interp,
            vec![
                label.unwrap_or(Value::Undefined),
                description.unwrap_or(Value::Undefined),
                control,
                error.unwrap_or(Value::Undefined),
            ],
        )
}

const FIELD_PROPS: &[&str] = &["label", "description", "error", "size", "hideLabel", "className", "style"];

fn text_field(interp: &mut Interpreter, props: &Props) -> ScriptResult<Value> {
    let size = props.string_or("size", "medium");
    let input = Host::new("input")
        .class("navds-text-field__input")
        .class("navds-body-short")
        .class(format!("navds-body-short--{}", size))
        .attr("type", Value::String(props.string_or("type", "text")))
        .forward(props, &[FIELD_PROPS, &["type"]].concat())
        .build(interp, Vec::new());
    Ok(form_field(interp, props, "navds-text-field", input))
}

fn textarea(interp: &mut Interpreter, props: &Props) -> ScriptResult<Value> {
    let size = props.string_or("size", "medium");
    let value = props.get("value");
    let input = Host::new("textarea")
        .class("navds-textarea__input")
        .class("navds-body-short")
        .class(format!("navds-body-short--{}", size))
        .forward(props, &[FIELD_PROPS, &["value", "maxLength", "minRows", "maxRows"]].concat())
        .build(interp, vec![value]);
    Ok(form_field(interp, props, "navds-textarea", input))
}

fn select(interp: &mut Interpreter, props: &Props) -> ScriptResult<Value> {
    let size = props.string_or("size", "medium");
    let input = Host::new("select")
        .class("navds-select__input")
        .class("navds-body-short")
        .class(format!("navds-body-short--{}", size))
        .forward(props, FIELD_PROPS)
        .build(interp, vec![props.children()]);
    Ok(form_field(interp, props, "navds-select", input))
}

fn toggle(interp: &mut Interpreter, props: &Props, kind: &str) -> ScriptResult<Value> {
    let input = Host::new("input")
        .class(format!("navds-{}__input", kind))
        .attr("type", Value::string("checkbox"))
        .attr("role", if kind == "switch" { Value::string("switch") } else { Value::Undefined })
        .forward(props, &["size", "className", "style", "hideLabel", "description", "loading", "position"])
        .build(interp, Vec::new());
    let text = Host::new("span")
        .class("navds-body-short")
        .build(interp, vec![props.children()]);
    let content = Host::new("span")
        .class(format!("navds-{}__content", kind))
        .build(interp, vec![text]);
    let label = Host::new("label")
        .class(format!("navds-{}__label", kind))
        .attr("htmlFor", props.get("id"))
        .build(interp, vec![content]);
    Ok(Host::new("div")
        .class(format!("navds-{}", kind))
        .class(size_class(&format!("navds-{}", kind), props, "medium"))
        .class_if(props.flag("disabled"), format!("navds-{}--disabled", kind))
        .forward(props, &["size", "hideLabel", "description", "loading", "position", "id", "checked", "defaultChecked", "value", "onChange", "disabled", "name"])
        .build(interp, vec![input, label]))
}

fn checkbox(interp: &mut Interpreter, props: &Props) -> ScriptResult<Value> {
    toggle(interp, props, "checkbox")
}

fn switch(interp: &mut Interpreter, props: &Props) -> ScriptResult<Value> {
    toggle(interp, props, "switch")
}

/// Component table in namespace order
const COMPONENTS: &[(&str, Render)] = &[
    ("Alert", alert),
    ("BodyLong", body_long),
    ("BodyShort", body_short),
    ("Box", layout_box),
    ("Button", button),
    ("Checkbox", checkbox),
    ("Detail", detail),
    ("HGrid", hgrid),
    ("HStack", hstack),
    ("Heading", heading),
    ("Label", label),
    ("Link", link),
    ("Loader", loader),
    ("Panel", panel),
    ("Select", select),
    ("Spacer", spacer),
    ("Switch", switch),
    ("Tag", tag),
    ("TextField", text_field),
    ("Textarea", textarea),
    ("VStack", vstack),
];

/// Every component as `(name, function)`, ready to bind into a scope
pub fn components() -> Vec<(String, Value)> {
    COMPONENTS
        .iter()
        .map(|&(name, render)| {
            let func = Function::native(name, move |interp, args| render(interp, &Props::from_args(args)));
            (name.to_string(), Value::Function(func))
        })
        .collect()
}
