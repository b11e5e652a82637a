//! Recursive-descent parser turning the token stream into an
//! [`IsaDocument`]. Every directive opens a new fold at a `:` token, so the
//! parser can resynchronize there after an error and keep collecting
//! diagnostics.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::soc::device::Endianness;

use super::ast::*;
use super::diagnostic::{
    DiagnosticLevel, DiagnosticPhase, IsaDiagnostic, SourceSpan,
};
use super::error::IsaError;
use super::lexer::{parse_number, Lexer, Token, TokenKind};

pub fn parse_str(path: PathBuf, src: &str) -> Result<IsaDocument, IsaError> {
    let (tokens, lex_diagnostics) = Lexer::new(src).tokenize();
    if lex_diagnostics.iter().any(|d| d.is_error()) {
        return Err(IsaError::Diagnostics {
            phase: DiagnosticPhase::Lexer,
            diagnostics: lex_diagnostics,
        });
    }
    Parser::new(tokens).parse_document(path)
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    diagnostics: Vec<IsaDiagnostic>,
    space_kinds: HashMap<String, SpaceKind>,
    bus_tags: HashSet<String>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            diagnostics: Vec::new(),
            space_kinds: HashMap::new(),
            bus_tags: HashSet::new(),
        }
    }

    pub fn parse_document(mut self, path: PathBuf) -> Result<IsaDocument, IsaError> {
        let mut items = Vec::new();
        while !self.at(TokenKind::Eof) {
            if !self.at(TokenKind::Colon) {
                let token = self.peek().clone();
                self.error(
                    "parser.expected-directive",
                    format!("expected ':' directive, found '{}'", token.lexeme),
                    token.span,
                );
                self.synchronize();
                continue;
            }
            match self.parse_directive() {
                Some(item) => items.push(item),
                None => self.synchronize(),
            }
        }
        if self.diagnostics.iter().any(|d| d.is_error()) {
            return Err(IsaError::Diagnostics {
                phase: DiagnosticPhase::Parser,
                diagnostics: self.diagnostics,
            });
        }
        Ok(IsaDocument::new(path, items))
    }

    fn parse_directive(&mut self) -> Option<IsaItem> {
        let colon = self.bump().clone();
        let tag = self.expect_ident("directive name")?;
        match tag.lexeme.as_str() {
            "param" => self.parse_param(colon.span),
            "space" => self.parse_space(colon.span),
            "bus" => self.parse_bus(colon.span),
            "include" => {
                let path = self.expect(TokenKind::String, "include path")?;
                Some(IsaItem::Include(IncludeDecl {
                    path: path.lexeme,
                    span: colon.span,
                }))
            }
            "attach" => {
                let name = self.expect_ident("core name")?;
                let path = self.expect(TokenKind::String, "core path")?;
                Some(IsaItem::Attach(AttachDecl {
                    name: name.lexeme,
                    path: path.lexeme,
                    span: colon.span,
                }))
            }
            other => self.parse_space_member(other.to_string(), colon.span),
        }
    }

    fn parse_param(&mut self, span: SourceSpan) -> Option<IsaItem> {
        let name = self.expect_ident("parameter name")?;
        self.expect(TokenKind::Equals, "'='")?;
        let value = self.bump().clone();
        match value.kind {
            TokenKind::Number | TokenKind::String | TokenKind::Identifier => {
                Some(IsaItem::Parameter(ParamDecl {
                    name: name.lexeme,
                    value: value.lexeme,
                    span,
                }))
            }
            _ => {
                self.error(
                    "parser.param-value",
                    "parameter value must be a number, string, or identifier",
                    value.span,
                );
                None
            }
        }
    }

    fn parse_space(&mut self, span: SourceSpan) -> Option<IsaItem> {
        let tag = self.expect_ident("space tag")?;
        let mut decl = SpaceDecl {
            tag: tag.lexeme.clone(),
            addr_bits: None,
            word_bits: None,
            kind: SpaceKind::ReadWrite,
            align: None,
            endian: None,
            span,
        };
        while let Some((key, key_span)) = self.try_attr_key() {
            match key.as_str() {
                "addr" => decl.addr_bits = self.attr_number().map(|v| v as u32),
                "word" => decl.word_bits = self.attr_number().map(|v| v as u32),
                "align" => decl.align = self.attr_number().map(|v| v as u32),
                "endian" => {
                    let value = self.attr_ident()?;
                    decl.endian = match value.as_str() {
                        "big" => Some(Endianness::Big),
                        "little" => Some(Endianness::Little),
                        other => {
                            self.error(
                                "parser.space-endian",
                                format!("unknown endianness '{other}'"),
                                key_span,
                            );
                            None
                        }
                    };
                }
                "type" => {
                    let value = self.attr_ident()?;
                    decl.kind = match value.as_str() {
                        "rw" => SpaceKind::ReadWrite,
                        "ro" => SpaceKind::ReadOnly,
                        "memio" => SpaceKind::MemIo,
                        "register" => SpaceKind::Register,
                        "logic" => SpaceKind::Logic,
                        other => {
                            self.error(
                                "parser.space-kind",
                                format!("unknown space type '{other}'"),
                                key_span,
                            );
                            return None;
                        }
                    };
                }
                other => {
                    self.error(
                        "parser.space-attr",
                        format!("unknown space attribute '{other}'"),
                        key_span,
                    );
                    self.skip_attr_value();
                }
            }
        }
        self.space_kinds.insert(decl.tag.clone(), decl.kind);
        Some(IsaItem::Space(decl))
    }

    fn parse_bus(&mut self, span: SourceSpan) -> Option<IsaItem> {
        let tag = self.expect_ident("bus tag")?;
        let mut addr_bits = 32u32;
        while let Some((key, key_span)) = self.try_attr_key() {
            match key.as_str() {
                "addr" => {
                    if let Some(value) = self.attr_number() {
                        addr_bits = value as u32;
                    }
                }
                other => {
                    self.error(
                        "parser.bus-attr",
                        format!("unknown bus attribute '{other}'"),
                        key_span,
                    );
                    self.skip_attr_value();
                }
            }
        }
        self.bus_tags.insert(tag.lexeme.clone());
        Some(IsaItem::Bus(BusDecl {
            tag: tag.lexeme,
            addr_bits,
            span,
        }))
    }

    /// `:tag ...` where the tag names a previously declared space or bus.
    fn parse_space_member(&mut self, tag: String, span: SourceSpan) -> Option<IsaItem> {
        let form_ref = if self.at(TokenKind::DoubleColon) {
            self.bump();
            Some(self.expect_ident("form name")?.lexeme)
        } else {
            None
        };
        let name = self.expect_ident("member name")?;

        if self.bus_tags.contains(&tag) {
            return self.parse_bus_range(tag, name.lexeme, span);
        }
        let Some(kind) = self.space_kinds.get(&tag).copied() else {
            self.error(
                "parser.unknown-directive",
                format!("directive ':{tag}' does not match a declared space or bus"),
                span,
            );
            return None;
        };

        if kind == SpaceKind::Logic {
            // Storage attributes route to field parsing so the validator can
            // reject them with a pointed message; a subfield block marks a
            // form; anything else is an instruction referencing `form_ref`.
            if self.fold_has_attr("offset") || self.fold_has_attr("reset") {
                return self.parse_field(tag, name.lexeme, span);
            }
            if self.fold_has_attr("subfields") {
                return self.parse_form(tag, form_ref, name.lexeme, span);
            }
            return self.parse_instruction(tag, form_ref, name.lexeme, span);
        }
        if let Some(form) = form_ref {
            self.error(
                "parser.member-form-ref",
                format!("'::{form}' is only meaningful inside logic spaces"),
                span.clone(),
            );
        }
        self.parse_field(tag, name.lexeme, span)
    }

    fn parse_field(&mut self, space: String, name: String, span: SourceSpan) -> Option<IsaItem> {
        let mut decl = FieldDecl {
            space,
            name,
            range: None,
            offset: None,
            size: None,
            reset: None,
            redirect: None,
            subfields: Vec::new(),
            descr: None,
            span: span.clone(),
        };
        if self.at(TokenKind::LBracket) {
            decl.range = self.parse_index_range();
        }
        while let Some((key, key_span)) = self.try_attr_key() {
            match key.as_str() {
                "offset" => decl.offset = self.attr_number(),
                "size" => decl.size = self.attr_number().map(|v| v as u32),
                "reset" => decl.reset = self.attr_number(),
                "descr" => decl.descr = self.attr_string(),
                "redirect" => decl.redirect = self.parse_redirect_ref(),
                "subfields" => {
                    decl.subfields = self.parse_subfield_block()?;
                }
                other => {
                    self.error(
                        "parser.field-attr",
                        format!("unknown field attribute '{other}'"),
                        key_span,
                    );
                    self.skip_attr_value();
                }
            }
        }
        Some(IsaItem::Field(decl))
    }

    fn parse_bus_range(&mut self, bus: String, name: String, span: SourceSpan) -> Option<IsaItem> {
        let mut offset = None;
        let mut size = None;
        let mut priority = 0u8;
        while let Some((key, key_span)) = self.try_attr_key() {
            match key.as_str() {
                "offset" => offset = self.attr_number(),
                "size" => size = self.attr_number(),
                "prio" => priority = self.attr_number().unwrap_or(0) as u8,
                other => {
                    self.error(
                        "parser.bus-range-attr",
                        format!("unknown bus range attribute '{other}'"),
                        key_span,
                    );
                    self.skip_attr_value();
                }
            }
        }
        let (Some(offset), Some(size)) = (offset, size) else {
            self.error(
                "parser.bus-range",
                "bus ranges require both 'offset' and 'size'",
                span,
            );
            return None;
        };
        Some(IsaItem::BusRange(BusRangeDecl {
            bus,
            name,
            offset,
            size,
            priority,
            span,
        }))
    }

    fn parse_form(
        &mut self,
        space: String,
        parent: Option<String>,
        name: String,
        span: SourceSpan,
    ) -> Option<IsaItem> {
        let mut descr = None;
        let mut subfields = Vec::new();
        while let Some((key, key_span)) = self.try_attr_key() {
            match key.as_str() {
                "subfields" => subfields = self.parse_subfield_block()?,
                "descr" => descr = self.attr_string(),
                other => {
                    self.error(
                        "parser.form-attr",
                        format!("unknown form attribute '{other}'"),
                        key_span,
                    );
                    self.skip_attr_value();
                }
            }
        }
        Some(IsaItem::Form(FormDecl {
            space,
            name,
            parent,
            subfields,
            descr,
            span,
        }))
    }

    fn parse_instruction(
        &mut self,
        space: String,
        form: Option<String>,
        name: String,
        span: SourceSpan,
    ) -> Option<IsaItem> {
        let mut decl = InstructionDecl {
            space,
            form,
            name,
            mask: Vec::new(),
            operands: Vec::new(),
            descr: None,
            span,
        };
        while let Some((key, key_span)) = self.try_attr_key() {
            match key.as_str() {
                "mask" => decl.mask = self.parse_mask_block()?,
                "operands" => decl.operands = self.parse_operand_list()?,
                "descr" => decl.descr = self.attr_string(),
                other => {
                    self.error(
                        "parser.instruction-attr",
                        format!("unknown instruction attribute '{other}'"),
                        key_span,
                    );
                    self.skip_attr_value();
                }
            }
        }
        Some(IsaItem::Instruction(decl))
    }

    fn parse_subfield_block(&mut self) -> Option<Vec<SubFieldDecl>> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut subfields = Vec::new();
        while !self.at(TokenKind::RBrace) {
            if self.at(TokenKind::Eof) {
                let span = self.peek().span.clone();
                self.error("parser.subfields", "subfield block is not closed", span);
                return None;
            }
            let name = self.expect_ident("subfield name")?;
            let spec = self.expect(TokenKind::BitSpec, "bit specification")?;
            let mut subfield = SubFieldDecl {
                name: name.lexeme,
                bit_spec: spec.lexeme,
                bit_spec_span: spec.span,
                role: OperandRole::Func,
                postfix: None,
                descr: None,
                span: name.span,
            };
            while let Some((key, key_span)) = self.try_attr_key() {
                match key.as_str() {
                    "op" => {
                        let raw = self.attr_ident()?;
                        subfield.role = self.parse_role(&raw, key_span)?;
                    }
                    "post" => subfield.postfix = self.attr_string(),
                    "descr" => subfield.descr = self.attr_string(),
                    other => {
                        self.error(
                            "parser.subfield-attr",
                            format!("unknown subfield attribute '{other}'"),
                            key_span,
                        );
                        self.skip_attr_value();
                    }
                }
            }
            subfields.push(subfield);
        }
        self.bump(); // closing brace
        Some(subfields)
    }

    /// `func | target | source | imm | addr | reg.<space>.<file>`
    fn parse_role(&mut self, raw: &str, span: SourceSpan) -> Option<OperandRole> {
        let role = match raw {
            "func" => OperandRole::Func,
            "target" => OperandRole::Target,
            "source" => OperandRole::Source,
            "imm" => OperandRole::Immediate,
            "addr" => OperandRole::Address,
            dotted if dotted.starts_with("reg.") => {
                let mut parts = dotted.splitn(3, '.');
                let _reg = parts.next();
                let space = parts.next().unwrap_or_default();
                let file = parts.next().unwrap_or_default();
                if space.is_empty() || file.is_empty() {
                    self.error(
                        "parser.subfield-role",
                        "register roles take the shape reg.<space>.<file>",
                        span,
                    );
                    return None;
                }
                OperandRole::Register {
                    space: space.to_string(),
                    file: file.to_string(),
                }
            }
            other => {
                self.error(
                    "parser.subfield-role",
                    format!("unknown operand role '{other}'"),
                    span,
                );
                return None;
            }
        };
        Some(role)
    }

    fn parse_mask_block(&mut self) -> Option<Vec<MaskField>> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut fields = Vec::new();
        while !self.at(TokenKind::RBrace) {
            if self.at(TokenKind::Comma) {
                self.bump();
                continue;
            }
            let name = self.expect_ident("mask field name")?;
            self.expect(TokenKind::Equals, "'='")?;
            let value = self.expect(TokenKind::Number, "mask value")?;
            fields.push(MaskField {
                field: name.lexeme,
                value: parse_number(&value.lexeme).unwrap_or(0),
                span: name.span,
            });
        }
        self.bump();
        Some(fields)
    }

    fn parse_operand_list(&mut self) -> Option<Vec<String>> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut operands = Vec::new();
        while !self.at(TokenKind::RParen) {
            if self.at(TokenKind::Comma) {
                self.bump();
                continue;
            }
            operands.push(self.expect_ident("operand name")?.lexeme);
        }
        self.bump();
        Some(operands)
    }

    fn parse_index_range(&mut self) -> Option<(u32, u32)> {
        self.bump(); // '['
        let start = self.expect(TokenKind::Number, "range start")?;
        self.expect(TokenKind::Dash, "'-'")?;
        let end = self.expect(TokenKind::Number, "range end")?;
        self.expect(TokenKind::RBracket, "']'")?;
        Some((
            parse_number(&start.lexeme)? as u32,
            parse_number(&end.lexeme)? as u32,
        ))
    }

    fn parse_redirect_ref(&mut self) -> Option<RedirectRef> {
        let target = self.attr_ident_token()?;
        let sub = if self.at(TokenKind::DoubleColon) {
            self.bump();
            Some(self.expect_ident("subfield name")?.lexeme)
        } else {
            None
        };
        Some(RedirectRef {
            target: target.lexeme,
            sub,
            span: target.span,
        })
    }

    // Token plumbing ----------------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    /// Scans the current fold (up to the next top-level directive) for an
    /// attribute key without consuming anything.
    fn fold_has_attr(&self, name: &str) -> bool {
        let mut depth = 0usize;
        let mut index = self.pos;
        while let Some(token) = self.tokens.get(index) {
            match token.kind {
                TokenKind::Eof => break,
                TokenKind::Colon if depth == 0 => break,
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => depth = depth.saturating_sub(1),
                TokenKind::Identifier if depth == 0 && token.lexeme == name => {
                    if self
                        .tokens
                        .get(index + 1)
                        .is_some_and(|next| next.kind == TokenKind::Equals)
                    {
                        return true;
                    }
                }
                _ => {}
            }
            index += 1;
        }
        false
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn bump(&mut self) -> &Token {
        let index = self.pos.min(self.tokens.len() - 1);
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        &self.tokens[index]
    }

    /// Consumes `key =` when the next tokens start an attribute.
    fn try_attr_key(&mut self) -> Option<(String, SourceSpan)> {
        if self.peek().kind != TokenKind::Identifier {
            return None;
        }
        let next = self.tokens.get(self.pos + 1)?;
        if next.kind != TokenKind::Equals {
            return None;
        }
        let key = self.bump().clone();
        self.bump(); // '='
        Some((key.lexeme, key.span))
    }

    fn attr_number(&mut self) -> Option<u64> {
        let token = self.expect(TokenKind::Number, "numeric value")?;
        parse_number(&token.lexeme)
    }

    fn attr_string(&mut self) -> Option<String> {
        Some(self.expect(TokenKind::String, "string value")?.lexeme)
    }

    fn attr_ident(&mut self) -> Option<String> {
        Some(self.attr_ident_token()?.lexeme)
    }

    fn attr_ident_token(&mut self) -> Option<Token> {
        self.expect(TokenKind::Identifier, "identifier value")
    }

    fn skip_attr_value(&mut self) {
        match self.peek().kind {
            TokenKind::LBrace => {
                let mut depth = 0usize;
                loop {
                    match self.bump().kind {
                        TokenKind::LBrace => depth += 1,
                        TokenKind::RBrace => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        TokenKind::Eof => break,
                        _ => {}
                    }
                }
            }
            TokenKind::Eof | TokenKind::Colon => {}
            _ => {
                self.bump();
            }
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Option<Token> {
        if self.at(kind) {
            return Some(self.bump().clone());
        }
        let token = self.peek().clone();
        self.error(
            "parser.expected-token",
            format!("expected {what}, found '{}'", token.lexeme),
            token.span,
        );
        None
    }

    fn expect_ident(&mut self, what: &str) -> Option<Token> {
        self.expect(TokenKind::Identifier, what)
    }

    fn error(&mut self, code: &'static str, message: impl Into<String>, span: SourceSpan) {
        self.diagnostics.push(IsaDiagnostic::new(
            DiagnosticPhase::Parser,
            DiagnosticLevel::Error,
            code,
            message,
            Some(span),
        ));
    }

    /// Skips forward to the next top-level directive.
    fn synchronize(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek().kind {
                TokenKind::Eof => break,
                TokenKind::Colon if depth == 0 => break,
                TokenKind::LBrace => {
                    depth += 1;
                    self.bump();
                }
                TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                    self.bump();
                }
                _ => {
                    self.bump();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> IsaDocument {
        parse_str(PathBuf::from("test.isa"), src).expect("document should parse")
    }

    #[test]
    fn spaces_and_fields_parse() {
        let doc = parse(
            ":space regs addr=32 word=64 type=register\n\
             :regs PC size=64 descr=\"program counter\"\n\
             :regs GPR[0-31] size=64",
        );
        assert_eq!(doc.items.len(), 3);
        let IsaItem::Field(gpr) = &doc.items[2] else {
            panic!("expected field decl");
        };
        assert_eq!(gpr.range, Some((0, 31)));
        assert_eq!(gpr.size, Some(64));
    }

    #[test]
    fn forms_and_instructions_disambiguate_in_logic_spaces() {
        let doc = parse(
            ":space insn addr=32 word=32 type=logic endian=big\n\
             :insn X_FORM subfields={\n\
                 OPCD @(0-5) op=func\n\
                 RT @(6-10) op=target\n\
             }\n\
             :insn::X_FORM add mask={OPCD=31}",
        );
        let IsaItem::Form(form) = &doc.items[1] else {
            panic!("expected form decl");
        };
        assert_eq!(form.name, "X_FORM");
        assert!(form.parent.is_none());
        assert_eq!(form.subfields.len(), 2);
        assert_eq!(form.subfields[1].role, OperandRole::Target);

        let IsaItem::Instruction(instr) = &doc.items[2] else {
            panic!("expected instruction decl");
        };
        assert_eq!(instr.form.as_deref(), Some("X_FORM"));
        assert_eq!(instr.mask.len(), 1);
        assert_eq!(instr.mask[0].value, 31);
    }

    #[test]
    fn form_inheritance_uses_the_double_colon() {
        let doc = parse(
            ":space insn addr=32 word=32 type=logic\n\
             :insn BASE subfields={ OPCD @(0-5) op=func }\n\
             :insn::BASE EXT subfields={ OE @(21) op=func post=\"o\" }",
        );
        let IsaItem::Form(ext) = &doc.items[2] else {
            panic!("expected form decl");
        };
        assert_eq!(ext.parent.as_deref(), Some("BASE"));
        assert!(ext.subfields[0].is_hidden());
    }

    #[test]
    fn bus_ranges_require_offset_and_size() {
        let doc = parse(
            ":bus sysbus addr=32\n\
             :sysbus flash offset=0x0 size=0x4000 prio=0",
        );
        let IsaItem::BusRange(range) = &doc.items[1] else {
            panic!("expected bus range");
        };
        assert_eq!(range.size, 0x4000);

        let err = parse_str(
            PathBuf::from("bad.isa"),
            ":bus sysbus addr=32\n:sysbus flash offset=0x0",
        )
        .unwrap_err();
        assert!(matches!(err, IsaError::Diagnostics { .. }));
    }

    #[test]
    fn register_roles_carry_space_and_file() {
        let doc = parse(
            ":space regs addr=32 word=64 type=register\n\
             :space insn addr=32 word=32 type=logic\n\
             :insn D subfields={ RT @(6-10) op=reg.regs.r }",
        );
        let IsaItem::Form(form) = &doc.items[2] else {
            panic!("expected form");
        };
        assert_eq!(
            form.subfields[0].role,
            OperandRole::Register {
                space: "regs".into(),
                file: "r".into()
            }
        );
    }

    #[test]
    fn unknown_directives_are_collected() {
        let err = parse_str(PathBuf::from("bad.isa"), ":nosuch FIELD size=8").unwrap_err();
        let IsaError::Diagnostics { phase, diagnostics } = err else {
            panic!("expected diagnostics");
        };
        assert_eq!(phase, DiagnosticPhase::Parser);
        assert!(diagnostics
            .iter()
            .any(|d| d.code == "parser.unknown-directive"));
    }

    #[test]
    fn includes_and_attaches_parse() {
        let doc = parse(":include \"base.isa\"\n:attach main \"core0.core\"");
        assert!(matches!(doc.items[0], IsaItem::Include(_)));
        let IsaItem::Attach(attach) = &doc.items[1] else {
            panic!("expected attach");
        };
        assert_eq!(attach.name, "main");
        assert_eq!(attach.path, "core0.core");
    }
}
